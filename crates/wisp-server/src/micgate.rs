//! The process-wide capture gate.
//!
//! One room at a time may capture audio for the entity. The gate is
//! keyed by room, not by connection: uploads arrive over plain HTTP
//! with only a room id to identify the caller. After a completed turn
//! the gate arms a cooldown so back-to-back captures cannot starve
//! other rooms.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use wisp_core::errors::GateError;
use wisp_core::events::{BusyReason, ServerEvent};
use wisp_core::ids::RoomId;

#[derive(Debug, Default)]
struct GateInner {
    holder: Option<RoomId>,
    cooldown_until: Option<Instant>,
}

/// Process-wide mutual exclusion for audio capture.
#[derive(Debug)]
pub struct MicGate {
    cooldown: Duration,
    inner: Mutex<GateInner>,
}

impl MicGate {
    /// Create a gate with the given post-turn cooldown.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            inner: Mutex::new(GateInner::default()),
        }
    }

    /// The configured cooldown, in whole seconds.
    #[must_use]
    pub fn cooldown_secs(&self) -> u64 {
        self.cooldown.as_secs()
    }

    /// The room currently holding the gate, if any.
    #[must_use]
    pub fn holder(&self) -> Option<RoomId> {
        self.inner.lock().holder.clone()
    }

    /// Claim the gate for `room_id`.
    ///
    /// Re-engaging from the holding room is idempotent. A fresh claim
    /// clears an already-elapsed cooldown.
    pub fn engage(&self, room_id: &RoomId) -> Result<(), GateError> {
        let mut inner = self.inner.lock();
        if let Some(holder) = &inner.holder {
            if holder == room_id {
                return Ok(());
            }
            return Err(GateError::Busy {
                holder_room: holder.clone(),
            });
        }
        if let Some(remaining) = remaining_cooldown(&inner, Instant::now()) {
            return Err(GateError::Cooldown {
                remaining_seconds: remaining,
            });
        }
        inner.cooldown_until = None;
        inner.holder = Some(room_id.clone());
        Ok(())
    }

    /// Would [`MicGate::engage`] succeed for `room_id` right now?
    ///
    /// Read-only; used to reject uploads before the expensive decode.
    pub fn check(&self, room_id: &RoomId) -> Result<(), GateError> {
        let inner = self.inner.lock();
        if let Some(holder) = &inner.holder {
            if holder == room_id {
                return Ok(());
            }
            return Err(GateError::Busy {
                holder_room: holder.clone(),
            });
        }
        if let Some(remaining) = remaining_cooldown(&inner, Instant::now()) {
            return Err(GateError::Cooldown {
                remaining_seconds: remaining,
            });
        }
        Ok(())
    }

    /// Release the gate without arming a cooldown, for captures that
    /// never became a turn. Returns false when `room_id` was not the
    /// holder.
    pub fn release(&self, room_id: &RoomId) -> bool {
        let mut inner = self.inner.lock();
        if inner.holder.as_ref() == Some(room_id) {
            inner.holder = None;
            true
        } else {
            false
        }
    }

    /// Release the gate after a completed turn and arm the cooldown.
    /// Returns false when `room_id` was not the holder.
    pub fn complete(&self, room_id: &RoomId) -> bool {
        let mut inner = self.inner.lock();
        if inner.holder.as_ref() == Some(room_id) {
            inner.holder = None;
            inner.cooldown_until = Some(Instant::now() + self.cooldown);
            true
        } else {
            false
        }
    }

    /// The busy event to send a client whose capture request lost.
    #[must_use]
    pub fn busy_event(err: &GateError) -> ServerEvent {
        match err {
            GateError::Busy { .. } => ServerEvent::InputDeviceBusy {
                reason: BusyReason::Capturing,
                remaining_seconds: None,
            },
            GateError::Cooldown { remaining_seconds } => ServerEvent::InputDeviceBusy {
                reason: BusyReason::Cooldown,
                remaining_seconds: Some(*remaining_seconds),
            },
        }
    }
}

/// Whole seconds of cooldown left, rounded up; `None` once elapsed.
fn remaining_cooldown(inner: &GateInner, now: Instant) -> Option<u64> {
    let until = inner.cooldown_until?;
    if now >= until {
        return None;
    }
    let left = until - now;
    Some(left.as_secs() + u64::from(left.subsec_nanos() > 0))
}
