//! Wire event unions.
//!
//! Three closed families, all internally tagged on `"type"`:
//!
//! - [`ClientEvent`] — inbound over a client's WebSocket
//! - [`ServerEvent`] — outbound to clients (broadcast or directed)
//! - [`LiveEvent`] — messages arriving from the external live AI stream,
//!   already mapped out of the provider wire format
//!
//! Exhaustive matching on these enums is what keeps event handling
//! honest; there are no stringly-typed event names anywhere else.

use serde::{Deserialize, Serialize};

use crate::ids::RoomId;
use crate::types::{EntitySnapshot, Position};

// ─────────────────────────────────────────────────────────────────────────────
// Inbound client events
// ─────────────────────────────────────────────────────────────────────────────

/// Commands a client may issue against the entity.
///
/// Only honored when the sending connection's room currently hosts the
/// entity; the gateway enforces that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum EntityCommand {
    /// Ask the entity to walk to a position.
    Move {
        /// Destination in scene coordinates.
        position: Position,
    },
    /// Ask the entity to interact with a scene object.
    Interact {
        /// Scene object identifier.
        object_id: String,
    },
    /// Ask the entity to move to another room.
    ChangeRoom {
        /// Destination room.
        room_id: RoomId,
    },
}

/// Events a client sends over its WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// The client's scene finished loading.
    ClientReady,
    /// The client's scene acknowledged the birth animation.
    EntityBornAck,
    /// The client toggled its audio capture state.
    InputDeviceState {
        /// True while the client is capturing.
        active: bool,
    },
    /// An entity command from the client's UI.
    EntityCommand {
        /// The requested command.
        command: EntityCommand,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound server events
// ─────────────────────────────────────────────────────────────────────────────

/// Why an input-device request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusyReason {
    /// Another client is currently capturing.
    Capturing,
    /// The post-turn cooldown has not elapsed.
    Cooldown,
}

/// Events the server sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Sent once per connection after room resolution.
    RoomAssigned {
        /// The room this connection was placed in.
        room_id: RoomId,
        /// Whether that room is the origin room.
        is_origin: bool,
        /// Whether the room already existed before this connection.
        existed: bool,
        /// Current entity view.
        entity: EntitySnapshot,
    },
    /// The origin room should play the birth sequence.
    EntityBirthRequested,
    /// The entity moved inside its room.
    EntityMoved {
        /// New position.
        position: Position,
    },
    /// The entity produced a line of speech.
    EntitySpoke {
        /// Final text for one speaker turn.
        text: String,
    },
    /// The entity moved to a different room.
    EntityChangedRoom {
        /// Destination room.
        room_id: RoomId,
        /// Whether clients should drop any displayed speech bubble.
        clear_prior_message: bool,
    },
    /// The entity was destroyed (no rooms remain).
    EntityDestroyed,
    /// The number of active (non-pending-destroy) rooms changed.
    RoomCountChanged {
        /// Active room count.
        count: usize,
    },
    /// Process-wide capture state changed.
    InputDeviceGlobalState {
        /// True while some client holds the capture gate.
        active: bool,
        /// Room of the capturing client, when active.
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        /// Remaining cooldown after a turn, when inactive.
        #[serde(skip_serializing_if = "Option::is_none")]
        cooldown_seconds: Option<u64>,
    },
    /// A capture request was rejected.
    InputDeviceBusy {
        /// Rejection category.
        reason: BusyReason,
        /// Remaining cooldown seconds, for the cooldown case.
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_seconds: Option<u64>,
    },
    /// A turn was accepted and is being processed.
    ProcessingStarted,
}

// ─────────────────────────────────────────────────────────────────────────────
// Live stream events
// ─────────────────────────────────────────────────────────────────────────────

/// A tool invocation requested by the live model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the reply when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Declared function name.
    pub name: String,
    /// Raw argument object.
    pub args: serde_json::Value,
}

/// The reply returned to the live model for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReply {
    /// Call id this reply answers, when the provider supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name, echoed.
    pub name: String,
    /// Result payload handed back to the model.
    pub payload: serde_json::Value,
}

/// Messages arriving from the external live stream during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum LiveEvent {
    /// An incremental text fragment.
    Text {
        /// Fragment content.
        content: String,
        /// True when this fragment closes one speaker turn.
        end_of_turn: bool,
    },
    /// The model requested a tool invocation.
    ToolCall {
        /// The call.
        call: ToolCall,
    },
    /// The model reported the user interrupted generation.
    Interrupted,
    /// The model finished generating for this turn.
    GenerationComplete,
    /// Usage metadata attached to the turn.
    Usage {
        /// Total token count reported by the provider.
        total_tokens: u64,
    },
}
