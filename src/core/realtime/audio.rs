//! Audio stream framer.
//!
//! Outbound: one `send_chunk` call produces exactly one `audio_chunk`
//! envelope. Chunk boundaries chosen by the recorder are never altered.
//!
//! Inbound: each `audio_chunk` envelope is decoded and handed to the sink
//! immediately, in arrival order. No buffering or reassembly.
//!
//! The end-of-audio control tells the playback collaborator to drop whatever
//! it has queued. It is a local signal, never sent to the backend.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error};

use super::base::{DecodeError, SendRejectReason, SendRejected, SessionState};
use super::codec::{self, AUDIO_CHUNK, Envelope};
use super::dispatcher::panic_message;

/// One immutable slice of PCM-like audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk(Bytes);

impl AudioChunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AudioChunk {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<Bytes> for AudioChunk {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

/// Receives decoded inbound chunks, in order.
pub type InboundChunkHandler = Arc<dyn Fn(&AudioChunk) + Send + Sync>;

/// Receives the end-of-audio control.
pub type EndOfAudioHandler = Arc<dyn Fn() + Send + Sync>;

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub chunks_sent: u64,
    pub chunks_received: u64,
    pub chunks_rejected: u64,
    pub end_of_audio_signals: u64,
}

/// Frames outbound audio and forwards inbound audio to the playback sink.
#[derive(Default)]
pub struct AudioStreamFramer {
    chunk_handlers: RwLock<Vec<InboundChunkHandler>>,
    end_of_audio_handlers: RwLock<Vec<EndOfAudioHandler>>,
    chunks_sent: AtomicU64,
    chunks_received: AtomicU64,
    chunks_rejected: AtomicU64,
    end_of_audio_signals: AtomicU64,
}

impl AudioStreamFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink for inbound chunks.
    pub fn on_inbound_chunk<F>(&self, handler: F)
    where
        F: Fn(&AudioChunk) + Send + Sync + 'static,
    {
        self.chunk_handlers.write().push(Arc::new(handler));
    }

    /// Register a sink for the end-of-audio control.
    pub fn on_end_of_audio<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.end_of_audio_handlers.write().push(Arc::new(handler));
    }

    /// Frame one outbound chunk.
    ///
    /// Rejected unless the session is active; the caller surfaces the
    /// rejection as a diagnostic and drops the chunk.
    pub fn frame_outbound(
        &self,
        chunk: &AudioChunk,
        session: SessionState,
    ) -> Result<Envelope, SendRejected> {
        if session != SessionState::Active {
            self.chunks_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SendRejected {
                event: AUDIO_CHUNK.to_string(),
                reason: SendRejectReason::SessionInactive(session),
            });
        }
        Ok(Envelope::audio_chunk(chunk.as_bytes()))
    }

    /// Record that a framed chunk reached the transport.
    pub fn mark_sent(&self) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chunk that was framed but refused by the transport.
    pub fn mark_rejected(&self) {
        self.chunks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Decode one inbound audio payload and deliver it to every sink.
    pub fn deliver_inbound(&self, data: Option<&Value>) -> Result<AudioChunk, DecodeError> {
        let chunk = AudioChunk::from(codec::decode_audio(data)?);
        self.chunks_received.fetch_add(1, Ordering::Relaxed);

        let handlers: Vec<InboundChunkHandler> = self.chunk_handlers.read().clone();
        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&chunk))) {
                error!("Inbound audio handler panicked: {}", panic_message(&*panic));
            }
        }
        Ok(chunk)
    }

    /// Tell the playback collaborator to stop consuming queued audio.
    pub fn signal_end_of_audio(&self) {
        self.end_of_audio_signals.fetch_add(1, Ordering::Relaxed);
        debug!("Signalling end of audio to playback");

        let handlers: Vec<EndOfAudioHandler> = self.end_of_audio_handlers.read().clone();
        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler())) {
                error!("End-of-audio handler panicked: {}", panic_message(&*panic));
            }
        }
    }

    pub fn stats(&self) -> FramerStats {
        FramerStats {
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            chunks_rejected: self.chunks_rejected.load(Ordering::Relaxed),
            end_of_audio_signals: self.end_of_audio_signals.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for AudioStreamFramer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStreamFramer")
            .field("stats", &self.stats())
            .finish()
    }
}
