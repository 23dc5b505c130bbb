//! Test Fixtures Module
//!
//! - Audio fixtures (programmatically generated PCM)
//! - Envelope fixtures (backend frames)

// Allow dead code in test fixtures - not every test file uses every fixture
#![allow(dead_code)]

pub mod audio_fixtures;
pub mod envelope_fixtures;

pub use audio_fixtures::*;
pub use envelope_fixtures as envelopes;
