//! Health endpoint payload.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the process answers.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered WebSocket connections.
    pub connections: usize,
    /// Rooms not pending destruction.
    pub active_rooms: usize,
}

/// Build the health snapshot from current counters.
#[must_use]
pub fn health_check(start_time: Instant, connections: usize, active_rooms: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".to_owned(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        active_rooms,
    }
}
