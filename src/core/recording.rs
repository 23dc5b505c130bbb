//! Per-session audio recording.
//!
//! Collects the user's outbound chunks and the model's inbound chunks for the
//! current session and writes one mono 16-bit WAV file per speaker when the
//! session ends:
//!
//! ```text
//! <directory>/<session_id>_user.wav   (input sample rate)
//! <directory>/<session_id>_model.wav  (output sample rate)
//! ```
//!
//! Chunks are treated as signed 16-bit little-endian PCM. A trailing odd byte
//! is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::realtime::Speaker;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("Failed to create recording directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
}

/// Buffers audio for the current session.
#[derive(Debug)]
pub struct SessionRecorder {
    directory: PathBuf,
    input_sample_rate: u32,
    output_sample_rate: u32,
    session_id: Option<String>,
    user: Vec<u8>,
    model: Vec<u8>,
}

impl SessionRecorder {
    pub fn new(
        directory: impl Into<PathBuf>,
        input_sample_rate: u32,
        output_sample_rate: u32,
    ) -> Self {
        Self {
            directory: directory.into(),
            input_sample_rate,
            output_sample_rate,
            session_id: None,
            user: Vec::new(),
            model: Vec::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Start buffering for a new session, discarding anything not yet taken.
    pub fn begin(&mut self, session_id: &str) {
        if let Some(previous) = self.session_id.replace(session_id.to_string()) {
            debug!(session_id = %previous, "Discarding untaken recording");
        }
        self.user.clear();
        self.model.clear();
    }

    /// Append one chunk. Ignored when no session is being recorded.
    pub fn record(&mut self, speaker: Speaker, chunk: &[u8]) {
        if self.session_id.is_none() {
            return;
        }
        match speaker {
            Speaker::User => self.user.extend_from_slice(chunk),
            Speaker::Model => self.model.extend_from_slice(chunk),
        }
    }

    /// Hand over the buffered session, leaving the recorder idle.
    pub fn take(&mut self) -> Option<Recording> {
        let session_id = self.session_id.take()?;
        Some(Recording {
            directory: self.directory.clone(),
            session_id,
            tracks: vec![
                Track {
                    speaker: Speaker::User,
                    sample_rate: self.input_sample_rate,
                    pcm: std::mem::take(&mut self.user),
                },
                Track {
                    speaker: Speaker::Model,
                    sample_rate: self.output_sample_rate,
                    pcm: std::mem::take(&mut self.model),
                },
            ],
        })
    }
}

#[derive(Debug)]
struct Track {
    speaker: Speaker,
    sample_rate: u32,
    pcm: Vec<u8>,
}

/// A finished session's audio, ready to be written.
#[derive(Debug)]
pub struct Recording {
    directory: PathBuf,
    session_id: String,
    tracks: Vec<Track>,
}

impl Recording {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Write one WAV file per speaker that produced audio.
    ///
    /// Returns the paths written. Blocking; run it off the async runtime.
    pub fn write(self) -> Result<Vec<PathBuf>, RecordingError> {
        if self.tracks.iter().all(|t| t.pcm.len() < 2) {
            debug!(session_id = %self.session_id, "Nothing recorded");
            return Ok(Vec::new());
        }

        fs::create_dir_all(&self.directory).map_err(|source| RecordingError::Directory {
            path: self.directory.clone(),
            source,
        })?;

        let mut written = Vec::new();
        for track in &self.tracks {
            if track.pcm.len() < 2 {
                continue;
            }

            let path = self
                .directory
                .join(format!("{}_{}.wav", self.session_id, track.speaker));
            write_wav(&path, track.sample_rate, &track.pcm).map_err(|source| {
                RecordingError::Wav {
                    path: path.clone(),
                    source,
                }
            })?;

            info!(
                session_id = %self.session_id,
                speaker = %track.speaker,
                path = %path.display(),
                "Saved session audio"
            );
            written.push(path);
        }
        Ok(written)
    }

    /// [`Recording::write`], logging instead of returning failures.
    pub fn write_logged(self) -> Vec<PathBuf> {
        let session_id = self.session_id.clone();
        match self.write() {
            Ok(paths) => paths,
            Err(e) => {
                warn!(session_id = %session_id, "Session recording failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn write_wav(path: &Path, sample_rate: u32, pcm: &[u8]) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }
    writer.finalize()
}
