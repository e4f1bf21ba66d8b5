//! Shared wire-visible types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A 2D position inside a room, in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Point-in-time view of the shared entity, as sent to clients.
///
/// `current_room_id` is the empty string while the entity is unborn;
/// clients treat the pair `alive == false` / empty room as "not placed
/// anywhere yet".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// What the entity is currently doing ("idle", "moving", ...).
    pub current_action: String,
    /// Room the entity currently inhabits, empty when unborn.
    pub current_room_id: String,
    /// Whether the entity has been born and not yet destroyed.
    pub alive: bool,
    /// Last known scene position.
    pub position: Position,
    /// When any of the above last changed.
    pub last_updated: DateTime<Utc>,
}

impl Default for EntitySnapshot {
    fn default() -> Self {
        Self {
            current_action: "idle".to_owned(),
            current_room_id: String::new(),
            alive: false,
            position: Position::default(),
            last_updated: Utc::now(),
        }
    }
}
