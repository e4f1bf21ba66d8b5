//! Client event dispatch and the world/live glue.
//!
//! [`Gateway`] owns every reaction to client traffic: room assignment
//! on connect, the birth handshake, capture-state changes, entity
//! commands, and the cleanup when a connection drops. It also pumps
//! registry signals (count changes, evictions, the all-rooms-empty
//! collapse) into broadcasts.
//!
//! [`TurnBridge`] is the half facing the other direction: callbacks
//! from a running live turn (fragments, tool calls) land here and turn
//! into entity mutations and room broadcasts.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wisp_core::events::{
    BusyReason, ClientEvent, EntityCommand, ServerEvent, ToolCall, ToolReply,
};
use wisp_core::ids::{ConnectionId, RoomId, SessionId, TurnId};
use wisp_core::types::{EntitySnapshot, Position};
use wisp_live::turn::{ToolOutcome, TurnCoordinator, TurnHooks};
use wisp_world::{EntityState, MigrationOutcome, RegistryEvent, Room, RoomRegistry};

use crate::micgate::MicGate;
use crate::websocket::{BroadcastManager, ClientConnection};

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Dispatches client events against the world state.
pub struct Gateway {
    registry: Arc<RoomRegistry>,
    entity: Arc<EntityState>,
    gate: Arc<MicGate>,
    coordinator: Arc<TurnCoordinator>,
    broadcast: Arc<BroadcastManager>,
    /// Connections that already received a birth request.
    birth_requested: DashMap<ConnectionId, ()>,
}

impl Gateway {
    /// Wire a gateway over shared world and live state.
    pub fn new(
        registry: Arc<RoomRegistry>,
        entity: Arc<EntityState>,
        gate: Arc<MicGate>,
        coordinator: Arc<TurnCoordinator>,
        broadcast: Arc<BroadcastManager>,
    ) -> Self {
        Self {
            registry,
            entity,
            gate,
            coordinator,
            broadcast,
            birth_requested: DashMap::new(),
        }
    }

    /// The room/session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// The entity placement state.
    #[must_use]
    pub fn entity(&self) -> &Arc<EntityState> {
        &self.entity
    }

    /// The capture gate.
    #[must_use]
    pub fn gate(&self) -> &Arc<MicGate> {
        &self.gate
    }

    /// The turn coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<TurnCoordinator> {
        &self.coordinator
    }

    /// The broadcast fan-out.
    #[must_use]
    pub fn broadcast(&self) -> &Arc<BroadcastManager> {
        &self.broadcast
    }

    /// Current entity view for connection greetings.
    #[must_use]
    pub fn entity_snapshot(&self) -> EntitySnapshot {
        self.entity.snapshot()
    }

    /// Resolve a room for a new connection and register its session.
    ///
    /// Returns the assigned room, whether it existed before this call,
    /// and the fresh session id.
    pub fn connect(&self, requested: Option<RoomId>) -> (Room, bool, SessionId) {
        loop {
            let (room, existed) = self.registry.resolve_room(requested.as_ref());
            let session_id = SessionId::generate();
            match self.registry.add_session(session_id.clone(), room.id.clone()) {
                Ok(_) => return (room, existed, session_id),
                Err(e) => {
                    // An eviction can land between resolve and add; the
                    // next resolve produces a room with no timer armed.
                    warn!(room_id = %room.id, error = %e, "session registration raced an eviction, retrying");
                }
            }
        }
    }

    /// Dispatch one parsed client event.
    pub fn handle_event(&self, conn: &Arc<ClientConnection>, event: ClientEvent) {
        match event {
            ClientEvent::ClientReady => self.client_ready(conn),
            ClientEvent::EntityBornAck => self.entity_born(conn),
            ClientEvent::InputDeviceState { active } => self.input_device_state(conn, active),
            ClientEvent::EntityCommand { command } => self.entity_command(conn, command),
        }
    }

    /// Tear down a connection's world state after its socket closed.
    ///
    /// The broadcast registration is removed by the socket loop; this
    /// handles the session, the gate, and a possible migration.
    pub fn disconnect(&self, conn: &Arc<ClientConnection>) {
        let _ = self.birth_requested.remove(&conn.id);
        if let Err(e) = self.registry.remove_session(&conn.session_id) {
            warn!(session_id = %conn.session_id, error = %e, "session removal failed");
        }
        let room_id = conn.room_id.clone();
        if self.registry.session_count(&room_id) > 0 {
            return;
        }
        // Last client out: a capture left engaged would starve every
        // other room, and a resident entity has no audience here.
        if self.gate.release(&room_id) {
            info!(%room_id, "capture gate released by disconnect");
            let _ = self.broadcast.broadcast_all(&ServerEvent::InputDeviceGlobalState {
                active: false,
                room_id: None,
                cooldown_seconds: None,
            });
        }
        if self.entity.current_room().as_ref() == Some(&room_id) {
            self.migrate_from(&room_id);
        }
    }

    /// Consume registry signals until shutdown.
    pub fn spawn_registry_pump(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        let mut events = gateway.registry.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => gateway.registry_event(event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "registry event stream lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    /// One scheduler tick: nudge an idle entity to a random spot.
    pub(crate) fn wander_step(&self) {
        if self.coordinator.is_busy() {
            return;
        }
        let Some(room_id) = self.entity.current_room() else {
            return;
        };
        let mut rng = rand::rng();
        let position = Position {
            x: rng.random_range(100..900),
            y: rng.random_range(100..500),
        };
        self.entity.set_position(position);
        let _ = self
            .broadcast
            .broadcast_to_room(&room_id, &ServerEvent::EntityMoved { position });
    }

    fn client_ready(&self, conn: &Arc<ClientConnection>) {
        let Some(origin) = self.registry.origin_room_id() else {
            return;
        };
        if conn.room_id != origin || self.entity.is_alive() {
            return;
        }
        if self.birth_requested.insert(conn.id.clone(), ()).is_none() {
            info!(connection_id = %conn.id, "requesting birth sequence");
            let _ = conn.send_event(&ServerEvent::EntityBirthRequested);
        }
    }

    fn entity_born(&self, conn: &Arc<ClientConnection>) {
        let Some(origin) = self.registry.origin_room_id() else {
            warn!(connection_id = %conn.id, "birth acknowledged with no origin room");
            return;
        };
        if self.entity.birth(origin.clone()) {
            info!(room_id = %origin, "entity born");
            self.birth_requested.clear();
            let position = self.entity.snapshot().position;
            let _ = self
                .broadcast
                .broadcast_to_room(&origin, &ServerEvent::EntityMoved { position });
        } else {
            debug!(connection_id = %conn.id, "duplicate birth ack ignored");
        }
    }

    fn input_device_state(&self, conn: &Arc<ClientConnection>, active: bool) {
        if active {
            match self.gate.engage(&conn.room_id) {
                Ok(()) => {
                    let _ = self.broadcast.broadcast_all(&ServerEvent::InputDeviceGlobalState {
                        active: true,
                        room_id: Some(conn.room_id.clone()),
                        cooldown_seconds: None,
                    });
                }
                Err(e) => {
                    debug!(connection_id = %conn.id, error = %e, "capture request rejected");
                    let _ = conn.send_event(&MicGate::busy_event(&e));
                }
            }
        } else if self.gate.release(&conn.room_id) {
            let _ = self.broadcast.broadcast_all(&ServerEvent::InputDeviceGlobalState {
                active: false,
                room_id: None,
                cooldown_seconds: None,
            });
        }
    }

    fn entity_command(&self, conn: &Arc<ClientConnection>, command: EntityCommand) {
        if self.entity.current_room().as_ref() != Some(&conn.room_id) {
            debug!(connection_id = %conn.id, "command from outside the entity's room ignored");
            return;
        }
        match command {
            EntityCommand::Move { position } => {
                self.entity.set_position(position);
                let _ = self
                    .broadcast
                    .broadcast_to_room(&conn.room_id, &ServerEvent::EntityMoved { position });
            }
            EntityCommand::Interact { object_id } => {
                debug!(object_id, "interact command");
                self.entity.set_action("interacting");
            }
            EntityCommand::ChangeRoom { room_id } => {
                if self.gate.holder().is_some() {
                    let _ = conn.send_event(&ServerEvent::InputDeviceBusy {
                        reason: BusyReason::Capturing,
                        remaining_seconds: None,
                    });
                    return;
                }
                let room = self.registry.get_room(&room_id);
                match self.entity.change_room(room_id.clone(), room.as_ref()) {
                    Ok(()) => {
                        info!(%room_id, "entity moved by command");
                        let _ = self.broadcast.broadcast_all(&ServerEvent::EntityChangedRoom {
                            room_id,
                            clear_prior_message: false,
                        });
                    }
                    Err(e) => debug!(%room_id, error = %e, "change-room command rejected"),
                }
            }
        }
    }

    async fn registry_event(&self, event: RegistryEvent) {
        match event {
            RegistryEvent::RoomCountChanged { active } => {
                let _ = self
                    .broadcast
                    .broadcast_all(&ServerEvent::RoomCountChanged { count: active });
            }
            RegistryEvent::RoomEvicted { room_id } => {
                debug!(%room_id, "room evicted");
                if self.entity.current_room().as_ref() == Some(&room_id) {
                    self.migrate_from(&room_id);
                }
            }
            RegistryEvent::AllRoomsEmpty => {
                if self.entity.destroy() {
                    info!("entity destroyed, no rooms remain");
                    let _ = self.broadcast.broadcast_all(&ServerEvent::EntityDestroyed);
                    self.coordinator.shutdown().await;
                }
            }
        }
    }

    fn migrate_from(&self, vacated: &RoomId) {
        match self.entity.migrate(vacated, &self.registry.all_rooms()) {
            MigrationOutcome::Moved(room_id) => {
                info!(from = %vacated, to = %room_id, "entity migrated");
                let _ = self.broadcast.broadcast_all(&ServerEvent::EntityChangedRoom {
                    room_id,
                    clear_prior_message: true,
                });
            }
            MigrationOutcome::Stayed => {
                debug!(room_id = %vacated, "entity stayed, no destination available");
            }
            MigrationOutcome::NotResident => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TurnBridge
// ─────────────────────────────────────────────────────────────────────────────

/// Turns live-turn callbacks into world mutations and broadcasts.
pub struct TurnBridge {
    registry: Arc<RoomRegistry>,
    entity: Arc<EntityState>,
    broadcast: Arc<BroadcastManager>,
}

impl TurnBridge {
    /// Wire a bridge over the same state the gateway uses.
    pub fn new(
        registry: Arc<RoomRegistry>,
        entity: Arc<EntityState>,
        broadcast: Arc<BroadcastManager>,
    ) -> Self {
        Self {
            registry,
            entity,
            broadcast,
        }
    }

    fn tool_move(&self, args: &Value) -> (Value, Option<String>) {
        let x = args
            .get("x")
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok());
        let y = args
            .get("y")
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok());
        let (Some(x), Some(y)) = (x, y) else {
            warn!(%args, "move_to called with invalid arguments");
            return (error_payload("x and y must be integers"), None);
        };
        if !self.entity.is_alive() {
            return (error_payload("entity is not alive"), None);
        }
        let position = Position { x, y };
        self.entity.set_position(position);
        if let Some(room_id) = self.entity.current_room() {
            let _ = self
                .broadcast
                .broadcast_to_room(&room_id, &ServerEvent::EntityMoved { position });
        }
        (ok_payload(), None)
    }

    fn tool_change_room(&self, args: &Value) -> (Value, Option<String>) {
        let Some(room_id) = args.get("roomId").and_then(Value::as_str).map(RoomId::from) else {
            warn!(%args, "change_room called without a roomId");
            return (error_payload("roomId must be a string"), None);
        };
        let room = self.registry.get_room(&room_id);
        match self.entity.change_room(room_id.clone(), room.as_ref()) {
            Ok(()) => {
                info!(%room_id, "entity changed room by tool call");
                let _ = self.broadcast.broadcast_all(&ServerEvent::EntityChangedRoom {
                    room_id: room_id.clone(),
                    clear_prior_message: false,
                });
                (ok_payload(), Some(format!("moving to room {room_id}")))
            }
            Err(e) => {
                warn!(%room_id, error = %e, "change_room tool call rejected");
                (error_payload(&e.to_string()), None)
            }
        }
    }

    fn tool_interact(&self, args: &Value) -> (Value, Option<String>) {
        let Some(object_id) = args.get("objectId").and_then(Value::as_str) else {
            warn!(%args, "interact called without an objectId");
            return (error_payload("objectId must be a string"), None);
        };
        if !self.entity.is_alive() {
            return (error_payload("entity is not alive"), None);
        }
        self.entity.set_action("interacting");
        debug!(object_id, "entity interacting");
        (ok_payload(), None)
    }

    fn tool_list_rooms(&self) -> (Value, Option<String>) {
        let rooms: Vec<Room> = self
            .registry
            .all_rooms()
            .into_iter()
            .filter(|r| !r.pending_destroy)
            .collect();
        let ids = rooms
            .iter()
            .map(|r| r.id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let listing: Vec<Value> = rooms
            .iter()
            .map(|r| json!({ "id": r.id.clone(), "isOrigin": r.is_origin }))
            .collect();
        let count = listing.len();
        let note = if count == 0 {
            "no rooms are open".to_owned()
        } else {
            format!("found {count} room(s): {ids}")
        };
        (json!({ "rooms": listing, "count": count }), Some(note))
    }
}

#[async_trait]
impl TurnHooks for TurnBridge {
    fn processing_started(&self, turn_id: &TurnId) {
        debug!(%turn_id, "turn accepted");
        if let Some(room_id) = self.entity.current_room() {
            let _ = self
                .broadcast
                .broadcast_to_room(&room_id, &ServerEvent::ProcessingStarted);
        }
    }

    fn fragment(&self, _turn_id: &TurnId, text: &str, end_of_turn: bool) {
        if !end_of_turn || text.is_empty() {
            return;
        }
        if let Some(room_id) = self.entity.current_room() {
            let _ = self.broadcast.broadcast_to_room(
                &room_id,
                &ServerEvent::EntitySpoke {
                    text: text.to_owned(),
                },
            );
        }
    }

    async fn tool_call(&self, call: &ToolCall) -> ToolOutcome {
        let (payload, note) = match call.name.as_str() {
            "move_to" => self.tool_move(&call.args),
            "change_room" => self.tool_change_room(&call.args),
            "interact" => self.tool_interact(&call.args),
            "list_rooms" => self.tool_list_rooms(),
            other => {
                warn!(tool = other, "model called an undeclared tool");
                (error_payload("unknown tool"), None)
            }
        };
        ToolOutcome {
            reply: ToolReply {
                id: call.id.clone(),
                name: call.name.clone(),
                payload,
            },
            note,
        }
    }
}

fn ok_payload() -> Value {
    json!({ "result": "ok" })
}

fn error_payload(message: &str) -> Value {
    json!({ "result": "error", "message": message })
}
