//! Room/session registry with deferred, cancelable eviction.
//!
//! Rooms are created implicitly per connecting client and torn down a
//! grace period after their last session leaves. Teardown is armed as a
//! tokio sleep task carrying a **generation token**; cancellation aborts
//! the task *and* invalidates the token, and a firing timer re-validates
//! the token plus the live session count before deleting anything. That
//! closes the race where a cancel and a fire land on the same tick.
//!
//! Duplicate creates and removes of unknown sessions are expected
//! traffic under reconnect races: they come back as [`RegistryError`]
//! values that callers log and move past.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wisp_core::errors::RegistryError;
use wisp_core::ids::{RoomId, SessionId};

/// Default grace period between a room emptying and its eviction.
pub const DEFAULT_EVICTION_GRACE: Duration = Duration::from_secs(20);

/// One ephemeral room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Room id.
    pub id: RoomId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Whether this is the origin room (first ever created).
    pub is_origin: bool,
    /// True while the room is empty and awaiting eviction.
    pub pending_destroy: bool,
}

/// One client's membership in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session id.
    pub id: SessionId,
    /// The room this session is bound to; immutable after creation.
    pub room_id: RoomId,
    /// Join time.
    pub joined_at: DateTime<Utc>,
}

/// Signals published by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// The number of active (non-pending-destroy) rooms changed.
    RoomCountChanged {
        /// New active room count.
        active: usize,
    },
    /// A room was deleted (eviction or explicit).
    RoomEvicted {
        /// The deleted room.
        room_id: RoomId,
    },
    /// The last room was deleted; nothing remains.
    AllRoomsEmpty,
}

struct ArmedTimer {
    token: u64,
    handle: JoinHandle<()>,
}

struct RegistryInner {
    rooms: HashMap<RoomId, Room>,
    sessions: HashMap<SessionId, Session>,
    origin: Option<RoomId>,
    timers: HashMap<RoomId, ArmedTimer>,
    next_token: u64,
}

impl RegistryInner {
    fn active_count(&self) -> usize {
        self.rooms.values().filter(|r| !r.pending_destroy).count()
    }

    fn sessions_in(&self, room_id: &RoomId) -> usize {
        self.sessions
            .values()
            .filter(|s| &s.room_id == room_id)
            .count()
    }
}

/// Owns rooms, sessions, and eviction timers.
pub struct RoomRegistry {
    inner: Mutex<RegistryInner>,
    events: broadcast::Sender<RegistryEvent>,
    grace: Duration,
}

impl RoomRegistry {
    /// Create a registry with the given eviction grace period.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        let (events, _) = broadcast::channel(128);
        Self {
            inner: Mutex::new(RegistryInner {
                rooms: HashMap::new(),
                sessions: HashMap::new(),
                origin: None,
                timers: HashMap::new(),
                next_token: 0,
            }),
            events,
            grace,
        }
    }

    /// Subscribe to registry signals.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// The configured grace period.
    #[must_use]
    pub fn grace(&self) -> Duration {
        self.grace
    }

    fn emit(&self, event: RegistryEvent) {
        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.events.send(event);
    }

    // ── Rooms ───────────────────────────────────────────────────────────────

    /// Create a room. The very first room ever created becomes the
    /// origin room, permanently.
    pub fn create_room(&self, id: RoomId) -> Result<Room, RegistryError> {
        let mut inner = self.inner.lock();
        if inner.rooms.contains_key(&id) {
            return Err(RegistryError::RoomExists { room_id: id });
        }
        let is_origin = inner.origin.is_none();
        if is_origin {
            inner.origin = Some(id.clone());
        }
        let room = Room {
            id: id.clone(),
            created_at: Utc::now(),
            is_origin,
            pending_destroy: false,
        };
        let _ = inner.rooms.insert(id.clone(), room.clone());
        info!(room_id = %id, is_origin, "room created");
        self.emit(RegistryEvent::RoomCountChanged {
            active: inner.active_count(),
        });
        Ok(room)
    }

    /// Look up a room by id.
    #[must_use]
    pub fn get_room(&self, id: &RoomId) -> Option<Room> {
        self.inner.lock().rooms.get(id).cloned()
    }

    /// All rooms, in no particular order.
    #[must_use]
    pub fn all_rooms(&self) -> Vec<Room> {
        self.inner.lock().rooms.values().cloned().collect()
    }

    /// The recorded origin room id, even if that room no longer exists.
    #[must_use]
    pub fn origin_room_id(&self) -> Option<RoomId> {
        self.inner.lock().origin.clone()
    }

    /// Number of rooms not marked pending-destroy.
    #[must_use]
    pub fn active_room_count(&self) -> usize {
        self.inner.lock().active_count()
    }

    /// Total number of rooms, pending or not.
    #[must_use]
    pub fn total_room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    /// Number of sessions bound to a room.
    #[must_use]
    pub fn session_count(&self, room_id: &RoomId) -> usize {
        self.inner.lock().sessions_in(room_id)
    }

    /// Delete a room immediately.
    ///
    /// Emits [`RegistryEvent::AllRoomsEmpty`] when this removed the last
    /// room. Sessions still bound to the room are purged with a warning;
    /// in normal operation rooms are only deleted once empty.
    pub fn delete_room(&self, id: &RoomId) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        self.delete_room_locked(&mut inner, id)
    }

    fn delete_room_locked(
        &self,
        inner: &mut RegistryInner,
        id: &RoomId,
    ) -> Result<(), RegistryError> {
        let Some(room) = inner.rooms.remove(id) else {
            return Err(RegistryError::RoomNotFound {
                room_id: id.clone(),
            });
        };
        if let Some(timer) = inner.timers.remove(id) {
            timer.handle.abort();
        }
        let orphaned = inner.sessions_in(id);
        if orphaned > 0 {
            warn!(room_id = %id, orphaned, "deleting room with live sessions");
            inner.sessions.retain(|_, s| &s.room_id != id);
        }
        info!(room_id = %id, "room deleted");
        if !room.pending_destroy {
            self.emit(RegistryEvent::RoomCountChanged {
                active: inner.active_count(),
            });
        }
        self.emit(RegistryEvent::RoomEvicted {
            room_id: id.clone(),
        });
        if inner.rooms.is_empty() {
            self.emit(RegistryEvent::AllRoomsEmpty);
        }
        Ok(())
    }

    /// Resolve the room for a connecting client.
    ///
    /// A requested id is honored only when that room exists and is
    /// currently empty (a returning client reclaiming its room inside
    /// the grace window). Anything else gets a fresh room under a new
    /// id; ids the registry has never seen are not adopted.
    pub fn resolve_room(&self, requested: Option<&RoomId>) -> (Room, bool) {
        if let Some(id) = requested {
            let inner = self.inner.lock();
            if let Some(room) = inner.rooms.get(id) {
                if inner.sessions_in(id) == 0 {
                    return (room.clone(), true);
                }
            }
        }
        loop {
            // v7 collisions are not a practical concern; the loop just
            // keeps the contract airtight.
            let id = RoomId::generate();
            if let Ok(room) = self.create_room(id) {
                return (room, false);
            }
        }
    }

    // ── Sessions ────────────────────────────────────────────────────────────

    /// Register a session in a room.
    ///
    /// Cancels any armed eviction timer for the room and clears its
    /// pending-destroy mark: a reconnect always wins the race against a
    /// deletion.
    pub fn add_session(
        &self,
        session_id: SessionId,
        room_id: RoomId,
    ) -> Result<Session, RegistryError> {
        let mut inner = self.inner.lock();
        if !inner.rooms.contains_key(&room_id) {
            return Err(RegistryError::RoomNotFound { room_id });
        }
        if inner.sessions.contains_key(&session_id) {
            return Err(RegistryError::SessionExists { session_id });
        }
        if let Some(timer) = inner.timers.remove(&room_id) {
            timer.handle.abort();
            debug!(room_id = %room_id, "eviction canceled by reconnect");
        }
        let mut count_changed = false;
        if let Some(room) = inner.rooms.get_mut(&room_id) {
            if room.pending_destroy {
                room.pending_destroy = false;
                count_changed = true;
            }
        }
        let session = Session {
            id: session_id.clone(),
            room_id: room_id.clone(),
            joined_at: Utc::now(),
        };
        let _ = inner.sessions.insert(session_id.clone(), session.clone());
        debug!(session_id = %session_id, room_id = %room_id, "session added");
        if count_changed {
            self.emit(RegistryEvent::RoomCountChanged {
                active: inner.active_count(),
            });
        }
        Ok(session)
    }

    /// Remove a session.
    ///
    /// When this empties the session's room, the room is marked
    /// pending-destroy and an eviction timer is armed (skipped if one is
    /// already armed). Takes `Arc<Self>` because the timer task calls
    /// back into the registry when it fires.
    pub fn remove_session(self: &Arc<Self>, session_id: &SessionId) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let Some(session) = inner.sessions.remove(session_id) else {
            return Err(RegistryError::SessionNotFound {
                session_id: session_id.clone(),
            });
        };
        let room_id = session.room_id;
        debug!(session_id = %session_id, room_id = %room_id, "session removed");
        if !inner.rooms.contains_key(&room_id) {
            debug!(room_id = %room_id, "session's room already gone");
            return Ok(());
        }
        if inner.sessions_in(&room_id) == 0 {
            let mut count_changed = false;
            if let Some(room) = inner.rooms.get_mut(&room_id) {
                if !room.pending_destroy {
                    room.pending_destroy = true;
                    count_changed = true;
                }
            }
            self.arm_eviction_locked(&mut inner, room_id);
            if count_changed {
                self.emit(RegistryEvent::RoomCountChanged {
                    active: inner.active_count(),
                });
            }
        } else {
            // Sessions remain; make sure nothing is pending for this room.
            if let Some(timer) = inner.timers.remove(&room_id) {
                timer.handle.abort();
            }
            if let Some(room) = inner.rooms.get_mut(&room_id) {
                room.pending_destroy = false;
            }
        }
        Ok(())
    }

    // ── Eviction ────────────────────────────────────────────────────────────

    fn arm_eviction_locked(self: &Arc<Self>, inner: &mut RegistryInner, room_id: RoomId) {
        if inner.timers.contains_key(&room_id) {
            debug!(room_id = %room_id, "eviction already armed");
            return;
        }
        inner.next_token += 1;
        let token = inner.next_token;
        let registry = Arc::clone(self);
        let grace = self.grace;
        let fire_room = room_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            registry.eviction_fired(&fire_room, token);
        });
        debug!(room_id = %room_id, token, grace_secs = grace.as_secs(), "eviction armed");
        let _ = inner.timers.insert(room_id, ArmedTimer { token, handle });
    }

    /// Called by a timer task after the grace period.
    ///
    /// Both re-validations are required: the token catches a cancel that
    /// raced the fire, and the session count catches a reconnect that
    /// landed between token bookkeeping steps. Either failing makes the
    /// fire a no-op.
    fn eviction_fired(&self, room_id: &RoomId, token: u64) {
        let mut inner = self.inner.lock();
        let current = matches!(inner.timers.get(room_id), Some(t) if t.token == token);
        if !current {
            debug!(room_id = %room_id, token, "stale eviction fire ignored");
            return;
        }
        let _ = inner.timers.remove(room_id);
        if inner.sessions_in(room_id) > 0 {
            debug!(room_id = %room_id, "eviction fire with live sessions ignored");
            return;
        }
        info!(room_id = %room_id, "grace period over, evicting room");
        if let Err(e) = self.delete_room_locked(&mut inner, room_id) {
            warn!(room_id = %room_id, error = %e, "eviction delete failed");
        }
    }
}
