//! Typed event dispatcher.
//!
//! Handlers are registered per event name and invoked synchronously in
//! registration order. Each invocation is isolated: a handler that returns an
//! error or panics is logged and skipped, the rest still run.
//!
//! Every decoded inbound envelope is dispatched twice: once as the generic
//! [`events::MESSAGE`] carrying the whole envelope, and once under its own
//! event name carrying only the payload (when the name is present).

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{error, trace, warn};

use super::base::{
    DecodeError, ProtocolWarning, SendRejected, SessionState, Speaker, UnexpectedDisconnect,
};
use super::codec::Envelope;

/// Event names used by the client.
pub mod events {
    /// Generic dispatch of every decoded inbound envelope
    pub const MESSAGE: &str = "message";

    // Lifecycle
    pub const CONNECTING: &str = "connecting";
    pub const OPENED: &str = "opened";
    pub const CLOSED: &str = "closed";
    pub const DISCONNECTED: &str = "disconnected";
    pub const DISCONNECTED_UNEXPECTEDLY: &str = "disconnected_unexpectedly";
    pub const ERROR: &str = "error";
    pub const SEND_FAILED: &str = "send_failed";

    // Session
    pub const SESSION_STATE: &str = "session_state";
    pub const TURN_STARTED: &str = "turn_started";
    pub const TURN_FINALIZED: &str = "turn_finalized";
    pub const INTERRUPTED: &str = "interrupted";

    // Inbound protocol events
    pub const STATUS: &str = "status";
    pub const USER_TRANSCRIPT: &str = "user_transcript";
    pub const MODEL_TRANSCRIPT: &str = "model_transcript";
    pub const AUDIO_CHUNK: &str = "audio_chunk";
    pub const TOOL_CALL: &str = "tool_call";
    pub const TOOL_RESPONSE: &str = "tool_response";
    pub const TURN_COMPLETE: &str = "turn_complete";
    pub const USAGE: &str = "usage";
    pub const INTERRUPT: &str = "interrupt";
}

/// Transport lifecycle as seen by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleSignal {
    Connecting,
    Opened,
    Closed {
        code: u16,
        reason: String,
        was_clean: bool,
        /// True when the close was requested locally
        explicit: bool,
    },
    /// Clean, locally requested disconnect
    Disconnected,
    DisconnectedUnexpectedly(UnexpectedDisconnect),
    TransportError(String),
}

/// Session and turn transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    TurnStarted(Speaker),
    TurnFinalized(Speaker),
    Interrupted {
        reason: Option<String>,
    },
}

/// Local, non-fatal problems surfaced for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    Decode(DecodeError),
    Protocol(ProtocolWarning),
    SendRejected(SendRejected),
}

/// Arguments passed to a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum EventArgs {
    /// Full inbound envelope (generic `message` dispatch)
    Message(Envelope),
    /// Payload of a named inbound envelope
    Data(Option<Value>),
    Lifecycle(LifecycleSignal),
    Session(SessionSignal),
    Diagnostic(Diagnostic),
}

impl EventArgs {
    /// Payload of a named inbound dispatch, if this is one.
    pub fn data(&self) -> Option<&Value> {
        match self {
            EventArgs::Data(data) => data.as_ref(),
            _ => None,
        }
    }

    /// Payload as a string, if it is one.
    pub fn data_str(&self) -> Option<&str> {
        self.data().and_then(Value::as_str)
    }
}

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a handler.
pub type HandlerResult = Result<(), HandlerError>;

/// A registered handler.
pub type EventHandler = Arc<dyn Fn(&EventArgs) -> HandlerResult + Send + Sync>;

/// Identifies one registration, for removal with [`EventDispatcher::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Mapping from event name to an ordered list of handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event`. Handlers run in registration order.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&EventArgs) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a registration. Returns false if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(hid, _)| *hid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for `event`.
    ///
    /// Returns the number of handlers that completed successfully. The handler
    /// list is snapshotted first, so handlers may register new handlers.
    pub fn emit(&self, event: &str, args: &EventArgs) -> usize {
        let snapshot: Vec<EventHandler> = match self.handlers.read().get(event) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };

        trace!(event, handlers = snapshot.len(), "Dispatching event");

        let mut succeeded = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(args))) {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => {
                    warn!(event, "Event handler failed: {}", e);
                }
                Err(panic) => {
                    error!(event, "Event handler panicked: {}", panic_message(&*panic));
                }
            }
        }
        succeeded
    }

    /// Dispatch a decoded inbound envelope: generic `message` first, then the
    /// named event with only its payload.
    ///
    /// `before_named` runs between the two dispatches, so state transitions
    /// driven by the envelope are applied before named handlers observe it.
    /// Returns [`ProtocolWarning::MissingEvent`] when the envelope has no name.
    pub fn dispatch_envelope<F>(
        &self,
        envelope: &Envelope,
        before_named: F,
    ) -> Result<(), ProtocolWarning>
    where
        F: FnOnce(&Envelope),
    {
        self.emit(events::MESSAGE, &EventArgs::Message(envelope.clone()));

        match envelope.event() {
            Some(name) => {
                before_named(envelope);
                self.emit(name, &EventArgs::Data(envelope.data().cloned()));
                Ok(())
            }
            None => Err(ProtocolWarning::MissingEvent),
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        let mut names: Vec<_> = handlers.keys().collect();
        names.sort();
        f.debug_struct("EventDispatcher")
            .field("events", &names)
            .finish()
    }
}

/// Best-effort extraction of a panic payload message.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
