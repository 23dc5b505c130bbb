//! Configuration module for the live session client
//!
//! Configuration comes from .env files, environment variables and an optional
//! YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Environment variables
//! - `LIVE_SESSION_URL` - backend WebSocket URL (default `ws://localhost:8081/ws`)
//! - `LIVE_SESSION_CONNECT_TIMEOUT` - connect timeout in seconds (default 10)
//! - `LIVE_SESSION_AUTH_TOKEN` - bearer token sent on the handshake
//! - `LIVE_SESSION_INPUT_SAMPLE_RATE` / `LIVE_SESSION_OUTPUT_SAMPLE_RATE`
//! - `LIVE_SESSION_CHUNK_MS` - outbound chunk duration
//! - `LIVE_SESSION_RECORDING_DIR` - enables session recording into this directory
//! - `LIVE_SESSION_LOG_LEVEL` - default tracing filter when `RUST_LOG` is unset
//!
//! # Example
//! ```rust,no_run
//! use live_session::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config = ClientConfig::from_file(&PathBuf::from("config.yaml"))?;
//! println!("Backend: {}", config.url);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

mod yaml;

pub use yaml::YamlConfig;

use crate::utils::url_validation::validate_backend_url;

pub const DEFAULT_URL: &str = "ws://localhost:8081/ws";
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_INPUT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24_000;
pub const DEFAULT_CHUNK_DURATION_MS: u32 = 100;
pub const DEFAULT_RECORDING_DIR: &str = "recordings";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Session recording configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub directory: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from(DEFAULT_RECORDING_DIR),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // Connection
    pub url: String,
    pub connect_timeout_seconds: u64,
    pub auth_token: Option<String>,

    /// Sent once with every `start_session`
    pub custom_params: HashMap<String, serde_json::Value>,

    // Audio format (16-bit mono PCM)
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub chunk_duration_ms: u32,

    pub recording: RecordingConfig,

    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            auth_token: None,
            custom_params: HashMap::new(),
            input_sample_rate: DEFAULT_INPUT_SAMPLE_RATE,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            chunk_duration_ms: DEFAULT_CHUNK_DURATION_MS,
            recording: RecordingConfig::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Zeroize the auth token when the configuration is dropped.
impl Drop for ClientConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut token) = self.auth_token {
            token.zeroize();
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// .env files are loaded by the binary at startup, so their values are
    /// visible here as ordinary environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Self::env_base()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file on top of the environment.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// The merged configuration is validated before it is returned.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::env_base()?;
        config.apply_yaml(yaml_config);
        config.validate()?;
        Ok(config)
    }

    fn env_base() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();

        if let Some(url) = env_string("LIVE_SESSION_URL") {
            config.url = url;
        }
        if let Some(timeout) = env_parse("LIVE_SESSION_CONNECT_TIMEOUT")? {
            config.connect_timeout_seconds = timeout;
        }
        config.auth_token = env_string("LIVE_SESSION_AUTH_TOKEN");
        if let Some(rate) = env_parse("LIVE_SESSION_INPUT_SAMPLE_RATE")? {
            config.input_sample_rate = rate;
        }
        if let Some(rate) = env_parse("LIVE_SESSION_OUTPUT_SAMPLE_RATE")? {
            config.output_sample_rate = rate;
        }
        if let Some(ms) = env_parse("LIVE_SESSION_CHUNK_MS")? {
            config.chunk_duration_ms = ms;
        }
        if let Some(dir) = env_string("LIVE_SESSION_RECORDING_DIR") {
            config.recording = RecordingConfig {
                enabled: true,
                directory: PathBuf::from(dir),
            };
        }
        if let Some(level) = env_string("LIVE_SESSION_LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(client) = yaml.client {
            if let Some(url) = client.url {
                self.url = url;
            }
            if let Some(timeout) = client.connect_timeout_seconds {
                self.connect_timeout_seconds = timeout;
            }
            if client.auth_token.is_some() {
                self.auth_token = client.auth_token;
            }
        }

        if let Some(params) = yaml.session.and_then(|s| s.custom_params) {
            self.custom_params = params;
        }

        if let Some(audio) = yaml.audio {
            if let Some(rate) = audio.input_sample_rate {
                self.input_sample_rate = rate;
            }
            if let Some(rate) = audio.output_sample_rate {
                self.output_sample_rate = rate;
            }
            if let Some(ms) = audio.chunk_duration_ms {
                self.chunk_duration_ms = ms;
            }
        }

        if let Some(recording) = yaml.recording {
            if let Some(directory) = recording.directory {
                self.recording.directory = directory;
                self.recording.enabled = true;
            }
            if let Some(enabled) = recording.enabled {
                self.recording.enabled = enabled;
            }
        }

        if let Some(level) = yaml.logging.and_then(|l| l.level) {
            self.log_level = level;
        }
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validate_backend_url(&self.url)
            .map_err(|e| format!("Invalid backend URL '{}': {e}", self.url))?;

        if self.connect_timeout_seconds == 0 {
            return Err("connect_timeout_seconds must be greater than 0".into());
        }
        if !(10..=1000).contains(&self.chunk_duration_ms) {
            return Err(format!(
                "chunk_duration_ms must be between 10 and 1000, got {}",
                self.chunk_duration_ms
            )
            .into());
        }
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err("sample rates must be greater than 0".into());
        }
        if self.chunk_size_bytes() == 0 {
            return Err(format!(
                "chunk of {}ms at {}Hz holds no samples",
                self.chunk_duration_ms, self.input_sample_rate
            )
            .into());
        }
        if self.auth_token.as_deref().is_some_and(str::is_empty) {
            return Err("auth_token must not be empty when set".into());
        }

        Ok(())
    }

    /// Bytes in one outbound chunk of 16-bit mono PCM.
    pub fn chunk_size_bytes(&self) -> usize {
        let samples = self.input_sample_rate as u64 * self.chunk_duration_ms as u64 / 1000;
        (samples * 2) as usize
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key} '{raw}': {e}").into()),
        None => Ok(None),
    }
}
