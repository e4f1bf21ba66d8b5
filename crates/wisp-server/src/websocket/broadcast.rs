//! Event fan-out over registered connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use wisp_core::events::ServerEvent;
use wisp_core::ids::{ConnectionId, RoomId};

use super::connection::ClientConnection;

/// Registry of live connections with per-room and global broadcast.
///
/// Events are serialized once and shared across recipients. All
/// methods are synchronous; delivery is a bounded `try_send` into each
/// connection's write channel.
#[derive(Default)]
pub struct BroadcastManager {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl BroadcastManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Deregister a connection.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.write().remove(connection_id)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Number of registered connections bound to `room_id`.
    #[must_use]
    pub fn room_connection_count(&self, room_id: &RoomId) -> usize {
        self.connections
            .read()
            .values()
            .filter(|c| &c.room_id == room_id)
            .count()
    }

    /// Send an event to every connection. Returns the delivered count.
    pub fn broadcast_all(&self, event: &ServerEvent) -> usize {
        self.broadcast_where(event, |_| true)
    }

    /// Send an event to every connection in `room_id`. Returns the
    /// delivered count.
    pub fn broadcast_to_room(&self, room_id: &RoomId, event: &ServerEvent) -> usize {
        self.broadcast_where(event, |c| &c.room_id == room_id)
    }

    /// Send an event to one connection.
    pub fn send_to(&self, connection_id: &ConnectionId, event: &ServerEvent) -> bool {
        let Some(connection) = self.connections.read().get(connection_id).cloned() else {
            return false;
        };
        connection.send_event(event)
    }

    fn broadcast_where(
        &self,
        event: &ServerEvent,
        recipient: impl Fn(&ClientConnection) -> bool,
    ) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast event");
                return 0;
            }
        };
        let connections = self.connections.read();
        let mut delivered = 0;
        let mut dropped = 0;
        for connection in connections.values().filter(|c| recipient(c.as_ref())) {
            if connection.send(Arc::clone(&json)) {
                delivered += 1;
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(delivered, dropped, "broadcast dropped messages");
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use wisp_core::events::ServerEvent;
    use wisp_core::ids::SessionId;

    fn connection_in(room: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new(
            ConnectionId::generate(),
            RoomId::from(room),
            SessionId::generate(),
            tx,
        ));
        (conn, rx)
    }

    #[tokio::test]
    async fn broadcast_all_reaches_every_room() {
        let manager = BroadcastManager::new();
        let (a, mut rx_a) = connection_in("lobby");
        let (b, mut rx_b) = connection_in("attic");
        manager.add(a);
        manager.add(b);

        let delivered = manager.broadcast_all(&ServerEvent::EntityDestroyed);
        assert_eq!(delivered, 2);
        assert!(rx_a.recv().await.unwrap().contains("entity-destroyed"));
        assert!(rx_b.recv().await.unwrap().contains("entity-destroyed"));
    }

    #[tokio::test]
    async fn room_broadcast_filters_by_room() {
        let manager = BroadcastManager::new();
        let (a, mut rx_a) = connection_in("lobby");
        let (b, mut rx_b) = connection_in("attic");
        manager.add(a);
        manager.add(b);

        let delivered = manager.broadcast_to_room(
            &RoomId::from("lobby"),
            &ServerEvent::ProcessingStarted,
        );
        assert_eq!(delivered, 1);
        assert!(rx_a.recv().await.unwrap().contains("processing-started"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_targets_one_connection() {
        let manager = BroadcastManager::new();
        let (a, mut rx_a) = connection_in("lobby");
        let (b, mut rx_b) = connection_in("lobby");
        let target = a.id.clone();
        manager.add(a);
        manager.add(b);

        assert!(manager.send_to(&target, &ServerEvent::EntityBirthRequested));
        assert!(rx_a.recv().await.unwrap().contains("entity-birth-requested"));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn send_to_unknown_connection_is_false() {
        let manager = BroadcastManager::new();
        assert!(!manager.send_to(&ConnectionId::generate(), &ServerEvent::EntityDestroyed));
    }

    #[test]
    fn remove_drops_from_counts() {
        let manager = BroadcastManager::new();
        let (a, _rx) = connection_in("lobby");
        let id = a.id.clone();
        manager.add(a);
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.room_connection_count(&RoomId::from("lobby")), 1);

        assert!(manager.remove(&id).is_some());
        assert_eq!(manager.connection_count(), 0);
        assert!(manager.remove(&id).is_none());
    }
}
