//! Settings types, grouped by subsystem.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WispSettings {
    /// HTTP/WebSocket server settings.
    pub server: ServerSettings,
    /// Room and entity lifecycle settings.
    pub world: WorldSettings,
    /// Turn coordination settings.
    pub turn: TurnSettings,
    /// External live AI stream settings.
    pub live: LiveSettings,
    /// Audio clip handling settings.
    pub audio: AudioSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (0 asks the OS for a free one).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 50,
        }
    }
}

/// Room and entity lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldSettings {
    /// Grace period between a room emptying and its eviction, seconds.
    pub eviction_grace_secs: u64,
    /// Cooldown after a completed turn before capture reopens, seconds.
    pub cooldown_secs: u64,
    /// Interval between idle entity movements, seconds.
    pub movement_interval_secs: u64,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            eviction_grace_secs: 20,
            cooldown_secs: 5,
            movement_interval_secs: 3,
        }
    }
}

/// How final text is recovered from the accumulated turn buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Fragments are already delimited per speaker turn; concatenate.
    #[default]
    Delimited,
    /// Parse `[SPEAKER]: "..."` tags out of free-form text.
    Tagged,
}

/// Turn coordination settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnSettings {
    /// Hard wall-clock ceiling for one turn, seconds.
    pub overall_timeout_secs: u64,
    /// Give up when the stream goes quiet for this long, seconds.
    pub idle_timeout_secs: u64,
    /// Text recovery strategy.
    pub extraction: ExtractionMode,
    /// Advisory request budget per rolling minute.
    pub requests_per_minute: u32,
    /// Advisory token budget per rolling minute.
    pub tokens_per_minute: u64,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            overall_timeout_secs: 60,
            idle_timeout_secs: 15,
            extraction: ExtractionMode::default(),
            requests_per_minute: 30,
            tokens_per_minute: 1_000_000,
        }
    }
}

/// External live AI stream settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LiveSettings {
    /// API key for the live service. Absent disables the feature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// WebSocket endpoint.
    pub endpoint: String,
    /// System instruction given to the model at session setup.
    pub system_instruction: String,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "models/gemini-2.0-flash-exp".to_string(),
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent"
                .to_string(),
            system_instruction: "You are a small wandering spirit that lives \
                in the visitor's room. Keep replies to one or two short \
                sentences. Use the provided tools to move, interact, and \
                change rooms when asked."
                .to_string(),
        }
    }
}

/// Audio clip handling settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    /// Longest accepted clip, seconds.
    pub max_clip_secs: f64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self { max_clip_secs: 5.5 }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default tracing filter when `WISP_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
