pub mod realtime;
pub mod recording;

// Re-export commonly used types for convenience
pub use realtime::{
    AudioChunk, ConnectionState, EventArgs, LiveSessionClient, RealtimeError, RealtimeResult,
    SessionSnapshot, SessionState, Turn, events,
};
pub use recording::{Recording, RecordingError, SessionRecorder};
