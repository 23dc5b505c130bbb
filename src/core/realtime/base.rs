//! Base types for the live session protocol client.
//!
//! This module defines the error taxonomy and the small state enums shared by
//! the transport, codec, dispatcher, state machine and audio framer.
//!
//! # Error Taxonomy
//!
//! - [`ConnectError`] - the transport failed to establish a connection
//! - [`DecodeError`] - inbound bytes could not be decoded (envelope dropped)
//! - [`ProtocolWarning`] - a valid envelope was incomplete (never fatal)
//! - [`SendRejected`] - a send was attempted while not connected or while
//!   the session was not active
//! - [`UnexpectedDisconnect`] - the transport closed without a local close
//!
//! None of these terminate the client. They are surfaced to the host as
//! signals and leave the client in a state from which `connect` or `reset`
//! can recover.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// The transport failed to establish a connection.
///
/// Cloneable so that concurrent callers awaiting the same pending connect
/// attempt all observe the same outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The address could not be turned into a WebSocket request
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The WebSocket handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The handshake did not complete within the configured timeout
    #[error("Connection timed out after {0}s")]
    Timeout(u64),

    /// The attempt was cancelled by a local close or superseded by a newer attempt
    #[error("Connection attempt aborted")]
    Aborted,
}

/// Inbound bytes could not be decoded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Not parseable as the wire structure
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// An audio payload was not a valid base64 string
    #[error("Invalid audio payload: {0}")]
    InvalidAudio(String),
}

/// A valid envelope that is missing something the protocol expects.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ProtocolWarning {
    /// Envelope without an `event` name; forwarded as a generic message only
    #[error("Envelope has no event name")]
    MissingEvent,
}

/// Why an outbound send was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejectReason {
    /// The transport has no open connection
    NotConnected,
    /// Audio may only be sent while the session is active
    SessionInactive(SessionState),
}

impl fmt::Display for SendRejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendRejectReason::NotConnected => write!(f, "transport not connected"),
            SendRejectReason::SessionInactive(state) => {
                write!(f, "session is {state}, not active")
            }
        }
    }
}

/// An outbound send was refused locally. Never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Send rejected ({reason}): {event}")]
pub struct SendRejected {
    /// Name of the envelope that was dropped
    pub event: String,
    /// Why it was dropped
    pub reason: SendRejectReason,
}

/// The transport closed without a prior explicit close request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Disconnected unexpectedly (code {code}): {reason}")]
pub struct UnexpectedDisconnect {
    /// WebSocket close code (1006 when no close frame was received)
    pub code: u16,
    /// Close reason, empty when none was given
    pub reason: String,
}

/// Errors returned by the live session client.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the backend failed
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Outbound send was refused
    #[error(transparent)]
    SendRejected(#[from] SendRejected),

    /// Operation not allowed in the current session state
    #[error("Session error: {0}")]
    SessionError(String),

    /// The coordinating task has stopped
    #[error("Client is shut down")]
    ClientClosed,
}

/// Result type for live session operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// State Enums
// =============================================================================

/// State of the transport's current link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No link
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Link open
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Lifecycle of one conversational exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session has been started (or the client was reset)
    #[default]
    None,
    /// `start_session` sent, waiting for `setup_complete`
    Starting,
    /// Backend is ready; audio may flow
    Active,
    /// Session finished; terminal until reset or a new start
    Ended,
}

impl SessionState {
    /// Whether `start_session` is allowed from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::None | SessionState::Ended)
    }

    /// Whether the session is starting or active.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::None => write!(f, "none"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Ended => write!(f, "ended"),
        }
    }
}

/// A party that can own the conversational floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The local user
    User,
    /// The backend model
    Model,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Model => write!(f, "model"),
        }
    }
}

/// Whose content is currently streaming. Derived state: only the state
/// machine's assign/finalize transitions change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Turn {
    /// Nobody holds the floor
    #[default]
    None,
    /// The user is speaking
    User,
    /// The model is speaking
    Model,
}

impl Turn {
    /// The speaker holding this turn, if any.
    pub fn speaker(&self) -> Option<Speaker> {
        match self {
            Turn::None => None,
            Turn::User => Some(Speaker::User),
            Turn::Model => Some(Speaker::Model),
        }
    }
}

impl From<Speaker> for Turn {
    fn from(speaker: Speaker) -> Self {
        match speaker {
            Speaker::User => Turn::User,
            Speaker::Model => Turn::Model,
        }
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Turn::None => write!(f, "none"),
            Turn::User => write!(f, "user"),
            Turn::Model => write!(f, "model"),
        }
    }
}
