//! Mock live session backend
//!
//! A scriptable WebSocket server speaking the envelope protocol:
//! - Records every envelope the client sends
//! - Answers `start_session` with `status: setup_complete`
//! - Pushes arbitrary frames on demand (transcripts, audio, interrupts)
//! - Closes with or without a close frame
//! - Sends malformed payloads

// Allow dead code in test infrastructure - not every test file uses every helper
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub mod websocket_mock;

pub use websocket_mock::{MockBackend, MockBehaviour, ServerAction};

/// Statistics collector for the mock backend
#[derive(Debug, Default)]
pub struct MockStats {
    pub connections: AtomicU64,
    pub envelopes_received: AtomicU64,
    pub malformed_received: AtomicU64,
    pub frames_pushed: AtomicU64,
}

impl MockStats {
    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_envelope(&self) {
        self.envelopes_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push(&self) {
        self.frames_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> String {
        format!(
            "Connections: {}, Envelopes: {}, Malformed: {}, Pushed: {}",
            self.connections.load(Ordering::Relaxed),
            self.envelopes_received.load(Ordering::Relaxed),
            self.malformed_received.load(Ordering::Relaxed),
            self.frames_pushed.load(Ordering::Relaxed),
        )
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
