//! # wisp-core
//!
//! Shared vocabulary for the wisp service. Every other crate in the
//! workspace depends on this one and nothing else in the workspace.
//!
//! - **Branded IDs**: `RoomId`, `SessionId`, `ConnectionId`, `TurnId`
//! - **Wire events**: closed tagged unions for client, server, and live
//!   stream messages
//! - **Shared types**: `Position`, `EntitySnapshot`
//! - **Errors**: registry/entity/gate error types and the `WispError`
//!   aggregate

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod types;

pub use errors::WispError;
pub use ids::{ConnectionId, RoomId, SessionId, TurnId};
