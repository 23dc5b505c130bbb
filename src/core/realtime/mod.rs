//! Real-time session protocol client.
//!
//! Multiplexes transcript text, audio, tool events and control signals over
//! one WebSocket connection to a conversational backend.
//!
//! # Architecture
//!
//! - [`transport`] - one persistent connection, lifecycle signals, epoch guard
//! - [`codec`] - JSON envelopes, base64 audio
//! - [`dispatcher`] - named handlers with per-handler isolation
//! - [`session`] - session lifecycle and turn ownership
//! - [`audio`] - outbound chunk framing, inbound audio delivery
//! - [`client`] - single-writer coordinating task tying the above together
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use live_session::config::ClientConfig;
//! use live_session::core::realtime::{LiveSessionClient, events};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let client = LiveSessionClient::from_config(&config);
//!
//! client.on(events::MODEL_TRANSCRIPT, |args| {
//!     print!("{}", args.data_str().unwrap_or_default());
//!     Ok(())
//! });
//! client.on_inbound_chunk(|chunk| {
//!     println!("{} bytes of model audio", chunk.len());
//! });
//!
//! client.connect().await?;
//! client.start_session(HashMap::new()).await?;
//! // ... wait for setup_complete, then:
//! client.send_chunk(vec![0u8; 3200]).await?;
//! client.end_session().await?;
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod audio;
mod base;
pub mod client;
pub mod codec;
pub mod dispatcher;
pub mod session;
pub mod transport;

pub use audio::{AudioChunk, AudioStreamFramer, FramerStats};
pub use base::{
    ConnectError, ConnectionState, DecodeError, ProtocolWarning, RealtimeError, RealtimeResult,
    SendRejectReason, SendRejected, SessionState, Speaker, Turn, UnexpectedDisconnect,
};
pub use client::{ClientOptions, LiveSessionClient, SessionSnapshot};
pub use codec::Envelope;
pub use dispatcher::{
    Diagnostic, EventArgs, EventDispatcher, HandlerError, HandlerId, HandlerResult,
    LifecycleSignal, SessionSignal, events,
};
pub use session::{SessionStateMachine, SessionView};
pub use transport::{Transport, TransportSignal, WebSocketTransport};
