//! Envelope fixtures for frames the backend sends

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

pub fn setup_complete() -> Value {
    json!({"event": "status", "data": "setup_complete"})
}

pub fn user_transcript(text: &str) -> Value {
    json!({"event": "user_transcript", "data": text})
}

pub fn model_transcript(text: &str) -> Value {
    json!({"event": "model_transcript", "data": text})
}

pub fn model_audio(pcm: &[u8]) -> Value {
    json!({"event": "audio_chunk", "data": STANDARD.encode(pcm)})
}

pub fn tool_call(name: &str, args: Value) -> Value {
    json!({"event": "tool_call", "data": {"name": name, "args": args}})
}

pub fn tool_response(name: &str, result: Value) -> Value {
    json!({"event": "tool_response", "data": {"name": name, "result": result}})
}

pub fn interrupt(reason: &str) -> Value {
    json!({"event": "interrupt", "data": {"reason": reason}})
}

pub fn turn_complete() -> Value {
    json!({"event": "turn_complete"})
}

pub fn usage(input_tokens: u64, output_tokens: u64) -> Value {
    json!({"event": "usage", "data": {"input_tokens": input_tokens, "output_tokens": output_tokens}})
}
