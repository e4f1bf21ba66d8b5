//! Error types for the core domains.
//!
//! Built on [`thiserror`]:
//!
//! - [`RegistryError`]: room/session bookkeeping conflicts, expected
//!   under reconnect races and warned-then-ignored at call sites
//! - [`EntityError`]: rejected entity placement transitions
//! - [`GateError`]: input-device gate rejections, carried back to the
//!   caller as structured data rather than logged as failures
//! - [`WispError`]: top-level aggregate for callers that cross domains
//!
//! The live-stream and audio-decode boundaries define their own error
//! types next to their implementations; they convert into [`WispError`]
//! via `Internal` when they escape that far.

use thiserror::Error;

use crate::ids::{RoomId, SessionId};

// ─────────────────────────────────────────────────────────────────────────────
// RegistryError
// ─────────────────────────────────────────────────────────────────────────────

/// Room/session registry conflicts.
///
/// None of these are fatal: disconnect/reconnect races produce them in
/// normal operation. Callers log at `warn` and continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A room with this id already exists.
    #[error("room {room_id} already exists")]
    RoomExists {
        /// Offending room id.
        room_id: RoomId,
    },

    /// No room with this id.
    #[error("room {room_id} not found")]
    RoomNotFound {
        /// Offending room id.
        room_id: RoomId,
    },

    /// A session with this id is already registered.
    #[error("session {session_id} already exists")]
    SessionExists {
        /// Offending session id.
        session_id: SessionId,
    },

    /// No session with this id.
    #[error("session {session_id} not found")]
    SessionNotFound {
        /// Offending session id.
        session_id: SessionId,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// EntityError
// ─────────────────────────────────────────────────────────────────────────────

/// Rejected entity placement transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    /// An operation required a living entity.
    #[error("entity is not alive")]
    NotAlive,

    /// The destination room is missing or marked for destruction.
    #[error("room {room_id} is not available for the entity")]
    RoomUnavailable {
        /// Rejected destination.
        room_id: RoomId,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// GateError
// ─────────────────────────────────────────────────────────────────────────────

/// Input-device gate rejections.
///
/// These are expected outcomes, not faults: the caller turns them into
/// a structured busy event or a 429 response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Another client holds the capture gate.
    #[error("input device is busy in room {holder_room}")]
    Busy {
        /// Room of the client that holds the gate.
        holder_room: RoomId,
    },

    /// The post-turn cooldown has not elapsed.
    #[error("input device cooling down, {remaining_seconds}s remaining")]
    Cooldown {
        /// Whole seconds left, rounded up.
        remaining_seconds: u64,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// WispError — top-level aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error for cross-domain callers.
#[derive(Debug, Error)]
pub enum WispError {
    /// Registry conflict.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// Entity transition rejection.
    #[error("{0}")]
    Entity(#[from] EntityError),

    /// Gate rejection.
    #[error("{0}")]
    Gate(#[from] GateError),

    /// Anything else, with a machine-readable code.
    #[error("[{code}] {message}")]
    Internal {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl WispError {
    /// Create an internal error with a code and message.
    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            code: code.into(),
            message: message.into(),
        }
    }
}
