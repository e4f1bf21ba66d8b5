//! WebSocket plumbing: connection state, fan-out, and the socket loop.

pub mod broadcast;
pub mod connection;
pub mod session;

pub use broadcast::BroadcastManager;
pub use connection::ClientConnection;
