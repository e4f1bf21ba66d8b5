//! # wisp-server
//!
//! The network boundary: an axum HTTP + WebSocket server that binds the
//! world, audio, and live crates to connected clients.
//!
//! - [`Gateway`]: room assignment, entity lifecycle, and client event
//!   dispatch, plus the bridge that turns live-stream callbacks into
//!   broadcasts
//! - [`MicGate`]: the process-wide capture gate with post-turn cooldown
//! - [`BroadcastManager`](websocket::BroadcastManager): per-room and
//!   global fan-out over registered connections
//! - HTTP routes: clip upload, entity location, health
//! - Background tasks: registry signal pump and the wander scheduler
//!
//! [`WispServer`] owns the router and the listener; wiring of the
//! underlying state lives in the daemon crate.

#![deny(unsafe_code)]

pub mod config;
pub mod gateway;
pub mod health;
pub mod micgate;
pub mod movement;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use gateway::{Gateway, TurnBridge};
pub use micgate::MicGate;
pub use server::{AppState, WispServer};
pub use shutdown::ShutdownCoordinator;
