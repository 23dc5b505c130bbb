use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// client:
///   url: "wss://voice.example.com/ws"
///   connect_timeout_seconds: 10
///   auth_token: "secret-token"
///
/// session:
///   custom_params:
///     language: "en-US"
///     voice: "Puck"
///
/// audio:
///   input_sample_rate: 16000
///   output_sample_rate: 24000
///   chunk_duration_ms: 100
///
/// recording:
///   enabled: true
///   directory: "./recordings"
///
/// logging:
///   level: "debug"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub client: Option<ClientYaml>,
    pub session: Option<SessionYaml>,
    pub audio: Option<AudioYaml>,
    pub recording: Option<RecordingYaml>,
    pub logging: Option<LoggingYaml>,
}

/// Connection settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ClientYaml {
    pub url: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
    pub auth_token: Option<String>,
}

/// Session settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    /// Sent once with `start_session`
    pub custom_params: Option<HashMap<String, serde_json::Value>>,
}

/// Audio format settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub input_sample_rate: Option<u32>,
    pub output_sample_rate: Option<u32>,
    pub chunk_duration_ms: Option<u32>,
}

/// Session recording settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RecordingYaml {
    pub enabled: Option<bool>,
    pub directory: Option<PathBuf>,
}

/// Logging settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingYaml {
    pub level: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
