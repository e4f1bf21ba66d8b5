//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the wisp server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max clip upload body size in bytes.
    pub max_clip_bytes: usize,
    /// Clip duration ceiling in seconds.
    pub max_clip_secs: f64,
    /// Allow any origin on the HTTP surface (scene assets are served
    /// elsewhere during development).
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 50,
            max_clip_bytes: 8 * 1024 * 1024, // 8 MB
            max_clip_secs: 5.5,
            permissive_cors: true,
        }
    }
}
