//! # wisp-world
//!
//! World state for the wisp service:
//!
//! - [`RoomRegistry`]: rooms and sessions, with deferred, cancelable,
//!   token-validated eviction of empty rooms
//! - [`EntityState`]: the single shared entity's placement state machine
//!
//! Both are plain injectable structs with interior mutability; nothing
//! here is ambient process state. The registry publishes
//! [`RegistryEvent`]s over a broadcast channel so the gateway can react
//! to count changes and evictions without polling.

#![deny(unsafe_code)]

pub mod entity;
pub mod registry;

pub use entity::{EntityState, MigrationOutcome, Placement};
pub use registry::{RegistryEvent, Room, RoomRegistry, Session};
