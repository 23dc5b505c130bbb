//! Wire envelope codec.
//!
//! Every message exchanged with the backend is one JSON object:
//!
//! ```text
//! { "event": <string, optional inbound, required outbound>, "data": <any> }
//! ```
//!
//! Outbound events:
//! - start_session - `{ "sessionId": .., "customParams": {..} }`
//! - audio_chunk - base64 string of raw PCM bytes
//! - end_session - no data
//!
//! Binary audio always travels as base64 text. The codec owns that transform
//! so the framer and state machine never touch the encoding.

use std::collections::HashMap;

use base64::prelude::*;
use bytes::Bytes;
use serde_json::{Map, Value};

use super::base::DecodeError;

/// Outbound event: begin a session.
pub const START_SESSION: &str = "start_session";
/// Outbound and inbound event: one slice of audio.
pub const AUDIO_CHUNK: &str = "audio_chunk";
/// Outbound event: end the session.
pub const END_SESSION: &str = "end_session";

/// One unit of wire exchange. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    event: Option<String>,
    data: Option<Value>,
}

impl Envelope {
    /// Create a named envelope.
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: Some(event.into()),
            data,
        }
    }

    /// `start_session` carrying the client-generated session id and the
    /// host's custom parameters.
    pub fn start_session(session_id: &str, custom_params: &HashMap<String, Value>) -> Self {
        let params: Map<String, Value> = custom_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut data = Map::new();
        data.insert("sessionId".to_string(), Value::String(session_id.to_string()));
        data.insert("customParams".to_string(), Value::Object(params));

        Self::new(START_SESSION, Some(Value::Object(data)))
    }

    /// `audio_chunk` carrying one base64-encoded chunk.
    pub fn audio_chunk(audio: &[u8]) -> Self {
        Self::new(AUDIO_CHUNK, Some(Value::String(encode_audio(audio))))
    }

    /// `end_session` with no data.
    pub fn end_session() -> Self {
        Self::new(END_SESSION, None)
    }

    /// Event name, if present.
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Payload, if present.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Payload as a string slice, when it is a JSON string.
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }
}

/// Serialize an envelope to its wire text. Total over all envelopes.
pub fn encode(envelope: &Envelope) -> String {
    let mut map = Map::new();
    if let Some(event) = &envelope.event {
        map.insert("event".to_string(), Value::String(event.clone()));
    }
    if let Some(data) = &envelope.data {
        map.insert("data".to_string(), data.clone());
    }
    Value::Object(map).to_string()
}

/// Parse wire bytes into an envelope.
///
/// A missing `event` is not an error here; the caller decides how to treat it.
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let Value::Object(mut map) = value else {
        return Err(DecodeError::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    };

    let event = match map.remove("event") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => Some(name),
        Some(other) => {
            return Err(DecodeError::Malformed(format!(
                "event must be a string, got {}",
                json_kind(&other)
            )));
        }
    };

    Ok(Envelope {
        event,
        data: map.remove("data"),
    })
}

/// Encode raw audio bytes as text-safe base64.
pub fn encode_audio(audio: &[u8]) -> String {
    BASE64_STANDARD.encode(audio)
}

/// Decode an inbound audio payload back into raw bytes.
pub fn decode_audio(data: Option<&Value>) -> Result<Bytes, DecodeError> {
    let encoded = data
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::InvalidAudio("audio payload is not a string".to_string()))?;

    BASE64_STANDARD
        .decode(encoded)
        .map(Bytes::from)
        .map_err(|e| DecodeError::InvalidAudio(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
