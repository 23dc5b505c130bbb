//! Session and turn-taking state machine.
//!
//! Session lifecycle: `none -> starting -> active -> ended` (ended is terminal
//! until `reset` or a new `start_session`).
//!
//! Turn ownership: `none | user | model`. Assigning a turn finalizes the
//! other one; `tool_call`, `tool_response`, `interrupt` and any close
//! finalize both. Finalizing a turn that is not held is a no-op, so each
//! turn is finalized exactly once.
//!
//! The state machine never suppresses inbound traffic. Envelopes that arrive
//! before a session exists still reach the host unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::audio::AudioStreamFramer;
use super::base::{
    RealtimeError, RealtimeResult, SendRejected, SessionState, Speaker, Turn, UnexpectedDisconnect,
};
use super::codec::Envelope;
use super::dispatcher::{EventArgs, EventDispatcher, LifecycleSignal, SessionSignal, events};

/// `status` payload that moves a starting session to active.
pub const SETUP_COMPLETE: &str = "setup_complete";

/// Read-only copy of the machine's state, refreshed before every signal so
/// handlers observe the state they are being told about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub state: SessionState,
    pub turn: Turn,
    pub session_id: Option<String>,
}

/// Explicit state owned by the coordinating task.
pub struct SessionStateMachine {
    state: SessionState,
    turn: Turn,
    session_id: Option<String>,
    custom_params: HashMap<String, Value>,
    view: Arc<RwLock<SessionView>>,
    dispatcher: Arc<EventDispatcher>,
    framer: Arc<AudioStreamFramer>,
}

impl SessionStateMachine {
    pub fn new(dispatcher: Arc<EventDispatcher>, framer: Arc<AudioStreamFramer>) -> Self {
        Self {
            state: SessionState::None,
            turn: Turn::None,
            session_id: None,
            custom_params: HashMap::new(),
            view: Arc::new(RwLock::new(SessionView::default())),
            dispatcher,
            framer,
        }
    }

    /// Shared handle to the published view.
    pub fn view(&self) -> Arc<RwLock<SessionView>> {
        Arc::clone(&self.view)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn turn(&self) -> Turn {
        self.turn
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn custom_params(&self) -> &HashMap<String, Value> {
        &self.custom_params
    }

    // -------------------------------------------------------------------------
    // Host operations
    // -------------------------------------------------------------------------

    /// Send `start_session` with a fresh client-generated id and move to
    /// `starting`.
    ///
    /// Fails without touching the transport if a session is starting or
    /// active. If the envelope cannot be sent the state is left unchanged.
    pub fn start_session<F>(
        &mut self,
        custom_params: HashMap<String, Value>,
        send: F,
    ) -> RealtimeResult<String>
    where
        F: FnOnce(&Envelope) -> Result<(), SendRejected>,
    {
        if !self.state.can_start() {
            return Err(RealtimeError::SessionError(format!(
                "cannot start a session while one is {}",
                self.state
            )));
        }

        let session_id = Uuid::new_v4().to_string();
        send(&Envelope::start_session(&session_id, &custom_params))?;

        info!(session_id = %session_id, "Session start requested");
        self.finalize_all();
        self.session_id = Some(session_id.clone());
        self.custom_params = custom_params;
        self.transition(SessionState::Starting);
        Ok(session_id)
    }

    /// Send `end_session` and move to `ended`.
    ///
    /// A no-op when no session is starting or active. The local transition
    /// happens even if the envelope could not be sent.
    pub fn end_session<F>(&mut self, send: F)
    where
        F: FnOnce(&Envelope) -> Result<(), SendRejected>,
    {
        if !self.state.is_live() {
            debug!(state = %self.state, "end_session ignored, no live session");
            return;
        }

        if let Err(e) = send(&Envelope::end_session()) {
            warn!(session_id = ?self.session_id, "end_session not delivered: {}", e);
        }

        self.finalize_all();
        self.transition(SessionState::Ended);
    }

    /// Hard reset to `none` from any state. Does not touch the transport.
    pub fn reset(&mut self) {
        self.finalize_all();
        if let Some(id) = self.session_id.take() {
            debug!(session_id = %id, "Session reset");
        }
        self.custom_params.clear();
        self.transition(SessionState::None);
        self.publish();
    }

    // -------------------------------------------------------------------------
    // Inbound events
    // -------------------------------------------------------------------------

    /// Apply the transition an inbound envelope triggers, if any.
    pub fn handle_inbound(&mut self, envelope: &Envelope) {
        let Some(event) = envelope.event() else {
            return;
        };

        match event {
            events::STATUS => self.handle_status(envelope.data_str()),
            events::USER_TRANSCRIPT => self.assign_turn(Speaker::User),
            events::MODEL_TRANSCRIPT => self.assign_turn(Speaker::Model),
            events::TOOL_CALL | events::TOOL_RESPONSE => self.finalize_all(),
            events::INTERRUPT => self.handle_interrupt(envelope.data()),
            _ => {}
        }
    }

    fn handle_status(&mut self, status: Option<&str>) {
        match status {
            Some(SETUP_COMPLETE) if self.state == SessionState::Starting => {
                info!(session_id = ?self.session_id, "Backend setup complete");
                self.transition(SessionState::Active);
            }
            Some(SETUP_COMPLETE) => {
                debug!(state = %self.state, "setup_complete outside of a starting session");
            }
            Some(other) => debug!(status = other, "Backend status"),
            None => debug!("Backend status without a value"),
        }
    }

    fn handle_interrupt(&mut self, data: Option<&Value>) {
        let reason = data
            .and_then(|d| d.get("reason"))
            .and_then(Value::as_str)
            .map(str::to_string);

        info!(reason = reason.as_deref().unwrap_or("none"), "Backend interrupt");
        self.finalize_all();
        self.framer.signal_end_of_audio();
        self.dispatcher.emit(
            events::INTERRUPTED,
            &EventArgs::Session(SessionSignal::Interrupted { reason }),
        );
    }

    // -------------------------------------------------------------------------
    // Transport events
    // -------------------------------------------------------------------------

    /// The transport closed.
    ///
    /// An unexpected close ends the session unconditionally and is surfaced as
    /// `disconnected_unexpectedly`; a local close ends a live session and is
    /// surfaced as `disconnected`.
    pub fn handle_closed(&mut self, code: u16, reason: &str, explicit: bool) {
        self.finalize_all();

        if explicit {
            if self.state.is_live() {
                self.transition(SessionState::Ended);
            }
            self.dispatcher.emit(
                events::DISCONNECTED,
                &EventArgs::Lifecycle(LifecycleSignal::Disconnected),
            );
        } else {
            warn!(code, reason, session_id = ?self.session_id, "Transport closed unexpectedly");
            self.transition(SessionState::Ended);
            self.dispatcher.emit(
                events::DISCONNECTED_UNEXPECTEDLY,
                &EventArgs::Lifecycle(LifecycleSignal::DisconnectedUnexpectedly(
                    UnexpectedDisconnect {
                        code,
                        reason: reason.to_string(),
                    },
                )),
            );
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn assign_turn(&mut self, speaker: Speaker) {
        if self.turn == Turn::from(speaker) {
            return;
        }

        self.finalize_all();
        self.turn = Turn::from(speaker);
        self.publish();
        debug!(turn = %speaker, "Turn started");

        if speaker == Speaker::User {
            self.framer.signal_end_of_audio();
        }
        self.dispatcher.emit(
            events::TURN_STARTED,
            &EventArgs::Session(SessionSignal::TurnStarted(speaker)),
        );
    }

    /// Finalize `speaker`'s turn if it holds the floor. Returns whether
    /// anything was finalized.
    pub fn finalize(&mut self, speaker: Speaker) -> bool {
        if self.turn != Turn::from(speaker) {
            return false;
        }

        self.turn = Turn::None;
        self.publish();
        debug!(turn = %speaker, "Turn finalized");
        self.dispatcher.emit(
            events::TURN_FINALIZED,
            &EventArgs::Session(SessionSignal::TurnFinalized(speaker)),
        );
        true
    }

    /// Finalize both turns.
    pub fn finalize_all(&mut self) {
        self.finalize(Speaker::User);
        self.finalize(Speaker::Model);
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }

        self.state = to;
        self.publish();
        info!(from = %from, to = %to, session_id = ?self.session_id, "Session state changed");
        self.dispatcher.emit(
            events::SESSION_STATE,
            &EventArgs::Session(SessionSignal::StateChanged { from, to }),
        );
    }

    fn publish(&self) {
        let mut view = self.view.write();
        view.state = self.state;
        view.turn = self.turn;
        if view.session_id != self.session_id {
            view.session_id = self.session_id.clone();
        }
    }
}

impl std::fmt::Debug for SessionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateMachine")
            .field("state", &self.state)
            .field("turn", &self.turn)
            .field("session_id", &self.session_id)
            .finish()
    }
}
