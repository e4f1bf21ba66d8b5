//! The single shared entity and its placement state machine.
//!
//! Exactly one entity exists per process. It starts unborn, is born into
//! the origin room on the first client's signal, wanders between rooms,
//! and is destroyed only when every room is gone. All transitions are
//! validated here; callers decide what to broadcast based on the
//! returned outcome.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info};

use wisp_core::errors::EntityError;
use wisp_core::ids::RoomId;
use wisp_core::types::{EntitySnapshot, Position};

use crate::registry::Room;

/// Where a newly born entity appears inside a room.
pub const SPAWN_POSITION: Position = Position { x: 400, y: 300 };

/// Where the entity is, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Not yet born (or destroyed).
    Unborn,
    /// Living in a room.
    Alive {
        /// The inhabited room.
        room_id: RoomId,
    },
}

/// Result of asking the entity to leave a vacated room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The entity relocated to this room.
    Moved(RoomId),
    /// No other room to go to; the entity stays put.
    Stayed,
    /// The entity was not in the vacated room; nothing to do.
    NotResident,
}

struct EntityInner {
    placement: Placement,
    action: String,
    position: Position,
    updated: DateTime<Utc>,
}

/// Thread-safe owner of the entity's placement, action, and position.
pub struct EntityState {
    inner: Mutex<EntityInner>,
}

impl Default for EntityState {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityState {
    /// Create an unborn entity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(EntityInner {
                placement: Placement::Unborn,
                action: "idle".to_owned(),
                position: Position::default(),
                updated: Utc::now(),
            }),
        }
    }

    /// Current wire-shaped view.
    #[must_use]
    pub fn snapshot(&self) -> EntitySnapshot {
        let inner = self.inner.lock();
        let (alive, room) = match &inner.placement {
            Placement::Unborn => (false, String::new()),
            Placement::Alive { room_id } => (true, room_id.as_str().to_owned()),
        };
        EntitySnapshot {
            current_action: inner.action.clone(),
            current_room_id: room,
            alive,
            position: inner.position,
            last_updated: inner.updated,
        }
    }

    /// Whether the entity is currently born.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        matches!(self.inner.lock().placement, Placement::Alive { .. })
    }

    /// The room the entity lives in, while alive.
    #[must_use]
    pub fn current_room(&self) -> Option<RoomId> {
        match &self.inner.lock().placement {
            Placement::Unborn => None,
            Placement::Alive { room_id } => Some(room_id.clone()),
        }
    }

    /// Birth the entity into a room. Idempotent: returns `false` without
    /// touching anything if the entity is already alive.
    pub fn birth(&self, origin: RoomId) -> bool {
        let mut inner = self.inner.lock();
        if matches!(inner.placement, Placement::Alive { .. }) {
            debug!("birth requested but entity already alive");
            return false;
        }
        info!(room_id = %origin, "entity born");
        inner.placement = Placement::Alive { room_id: origin };
        inner.action = "idle".to_owned();
        inner.position = SPAWN_POSITION;
        inner.updated = Utc::now();
        true
    }

    /// Move the entity to a specific room.
    ///
    /// `room` is the caller's registry lookup for `requested`; `None`
    /// and pending-destroy rooms are both rejected, so the entity can
    /// never land somewhere mid-teardown.
    pub fn change_room(&self, requested: RoomId, room: Option<&Room>) -> Result<(), EntityError> {
        let mut inner = self.inner.lock();
        if !matches!(inner.placement, Placement::Alive { .. }) {
            return Err(EntityError::NotAlive);
        }
        match room {
            Some(r) if !r.pending_destroy => {
                debug!(room_id = %requested, "entity changing room");
                inner.placement = Placement::Alive { room_id: requested };
                inner.updated = Utc::now();
                Ok(())
            }
            _ => Err(EntityError::RoomUnavailable { room_id: requested }),
        }
    }

    /// React to `vacated` being emptied or deleted.
    ///
    /// If the entity lives there, it picks a random active room from
    /// `rooms`; with no active candidates it falls back to any surviving
    /// room, and with nowhere at all to go it stays (destruction follows
    /// separately once the last room is gone).
    pub fn migrate(&self, vacated: &RoomId, rooms: &[Room]) -> MigrationOutcome {
        let mut inner = self.inner.lock();
        match &inner.placement {
            Placement::Alive { room_id } if room_id == vacated => {}
            _ => return MigrationOutcome::NotResident,
        }
        let active: Vec<&Room> = rooms
            .iter()
            .filter(|r| !r.pending_destroy && &r.id != vacated)
            .collect();
        let pool: Vec<&Room> = if active.is_empty() {
            rooms.iter().filter(|r| &r.id != vacated).collect()
        } else {
            active
        };
        if pool.is_empty() {
            debug!(vacated = %vacated, "no room to migrate to, entity stays");
            return MigrationOutcome::Stayed;
        }
        let pick = pool[rand::rng().random_range(0..pool.len())].id.clone();
        info!(from = %vacated, to = %pick, "entity migrating");
        inner.placement = Placement::Alive {
            room_id: pick.clone(),
        };
        inner.updated = Utc::now();
        MigrationOutcome::Moved(pick)
    }

    /// Destroy the entity, reverting to the unborn shape. Idempotent:
    /// returns `false` if it was not alive.
    pub fn destroy(&self) -> bool {
        let mut inner = self.inner.lock();
        if !matches!(inner.placement, Placement::Alive { .. }) {
            return false;
        }
        info!("entity destroyed");
        inner.placement = Placement::Unborn;
        inner.action = "idle".to_owned();
        inner.position = Position::default();
        inner.updated = Utc::now();
        true
    }

    /// Update the displayed action ("idle", "moving", ...).
    pub fn set_action(&self, action: &str) {
        let mut inner = self.inner.lock();
        inner.action = action.to_owned();
        inner.updated = Utc::now();
    }

    /// Update the scene position.
    pub fn set_position(&self, position: Position) {
        let mut inner = self.inner.lock();
        inner.position = position;
        inner.updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn room(id: &str, pending: bool) -> Room {
        Room {
            id: RoomId::from(id),
            created_at: Utc::now(),
            is_origin: false,
            pending_destroy: pending,
        }
    }

    #[test]
    fn birth_is_idempotent() {
        let entity = EntityState::new();
        assert!(entity.birth(RoomId::from("origin")));
        assert!(!entity.birth(RoomId::from("elsewhere")));
        assert_eq!(entity.current_room(), Some(RoomId::from("origin")));
    }

    #[test]
    fn birth_resets_pose() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("origin"));
        let snap = entity.snapshot();
        assert!(snap.alive);
        assert_eq!(snap.current_action, "idle");
        assert_eq!(snap.position, SPAWN_POSITION);
    }

    #[test]
    fn change_room_requires_life() {
        let entity = EntityState::new();
        let target = room("b", false);
        let err = entity
            .change_room(RoomId::from("b"), Some(&target))
            .unwrap_err();
        assert_matches!(err, EntityError::NotAlive);
    }

    #[test]
    fn change_room_rejects_missing_and_pending() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("a"));

        let err = entity.change_room(RoomId::from("ghost"), None).unwrap_err();
        assert_matches!(err, EntityError::RoomUnavailable { .. });

        let dying = room("b", true);
        let err = entity
            .change_room(RoomId::from("b"), Some(&dying))
            .unwrap_err();
        assert_matches!(err, EntityError::RoomUnavailable { .. });
        assert_eq!(entity.current_room(), Some(RoomId::from("a")));
    }

    #[test]
    fn change_room_moves_to_active_room() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("a"));
        let target = room("b", false);
        entity.change_room(RoomId::from("b"), Some(&target)).unwrap();
        assert_eq!(entity.current_room(), Some(RoomId::from("b")));
    }

    #[test]
    fn migrate_ignores_non_resident() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("a"));
        let rooms = [room("a", false), room("b", false)];
        let out = entity.migrate(&RoomId::from("b"), &rooms);
        assert_eq!(out, MigrationOutcome::NotResident);
        assert_eq!(entity.current_room(), Some(RoomId::from("a")));
    }

    #[test]
    fn migrate_picks_the_only_candidate() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("a"));
        let rooms = [room("a", true), room("b", false)];
        let out = entity.migrate(&RoomId::from("a"), &rooms);
        assert_eq!(out, MigrationOutcome::Moved(RoomId::from("b")));
        assert_eq!(entity.current_room(), Some(RoomId::from("b")));
    }

    #[test]
    fn migrate_picks_from_candidate_set() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("a"));
        let rooms = [room("a", true), room("b", false), room("c", false)];
        let out = entity.migrate(&RoomId::from("a"), &rooms);
        let moved_to = match out {
            MigrationOutcome::Moved(id) => id,
            other => panic!("expected a move, got {other:?}"),
        };
        assert!(moved_to == RoomId::from("b") || moved_to == RoomId::from("c"));
    }

    #[test]
    fn migrate_prefers_active_over_pending() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("a"));
        // Many pending rooms, one active: the active one must win.
        let rooms = [
            room("a", true),
            room("p1", true),
            room("p2", true),
            room("b", false),
        ];
        for _ in 0..20 {
            let fresh = EntityState::new();
            let _ = fresh.birth(RoomId::from("a"));
            assert_eq!(
                fresh.migrate(&RoomId::from("a"), &rooms),
                MigrationOutcome::Moved(RoomId::from("b"))
            );
        }
    }

    #[test]
    fn migrate_falls_back_to_pending_room() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("a"));
        let rooms = [room("a", true), room("p", true)];
        let out = entity.migrate(&RoomId::from("a"), &rooms);
        assert_eq!(out, MigrationOutcome::Moved(RoomId::from("p")));
    }

    #[test]
    fn migrate_with_nowhere_to_go_stays() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("a"));
        let rooms = [room("a", true)];
        let out = entity.migrate(&RoomId::from("a"), &rooms);
        assert_eq!(out, MigrationOutcome::Stayed);
        assert_eq!(entity.current_room(), Some(RoomId::from("a")));
    }

    #[test]
    fn destroy_reverts_to_unborn() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("a"));
        entity.set_action("moving");
        entity.set_position(Position::new(777, 321));

        assert!(entity.destroy());
        assert!(!entity.destroy());

        let snap = entity.snapshot();
        assert!(!snap.alive);
        assert!(snap.current_room_id.is_empty());
        assert_eq!(snap.current_action, "idle");
        assert_eq!(snap.position, Position::default());
    }

    #[test]
    fn pose_updates_touch_timestamp() {
        let entity = EntityState::new();
        let _ = entity.birth(RoomId::from("a"));
        let before = entity.snapshot().last_updated;
        entity.set_position(Position::new(150, 150));
        let after = entity.snapshot().last_updated;
        assert!(after >= before);
    }
}
