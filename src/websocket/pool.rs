use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use crate::error::WebSocketError;
use crate::websocket::ServerEvent;
use tracing::{debug, info, warn};

/// Live connections and the per-room broadcast groups they belong to.
///
/// Locks are always taken rooms first, then connections.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    rooms: RwLock<HashMap<String, HashSet<Uuid>>>,
    connections: RwLock<HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, id: Uuid, sender: mpsc::UnboundedSender<ServerEvent>) {
        self.connections.write().await.insert(id, sender);
        info!("Added connection {} to pool", id);
    }

    /// Drops the connection and every room subscription it held.
    pub async fn remove(&self, id: &Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(id);
            !members.is_empty()
        });

        let removed = self.connections.write().await.remove(id).is_some();
        if removed {
            info!("Removed connection {} from pool", id);
        }
        removed
    }

    pub async fn join(&self, id: Uuid, room_id: &str) {
        self.rooms
            .write()
            .await
            .entry(room_id.to_string())
            .or_default()
            .insert(id);
        debug!("Connection {} joined room {}", id, room_id);
    }

    pub async fn send_to(&self, id: &Uuid, event: ServerEvent) -> Result<(), WebSocketError> {
        match self.connections.read().await.get(id) {
            Some(sender) => sender
                .send(event)
                .map_err(|_| WebSocketError::UnknownConnection(*id)),
            None => Err(WebSocketError::UnknownConnection(*id)),
        }
    }

    /// Sends `event` to every subscriber of `room_id`, returning how many received it.
    pub async fn broadcast_to_room(&self, room_id: &str, event: &ServerEvent) -> usize {
        let rooms = self.rooms.read().await;
        let members = match rooms.get(room_id) {
            Some(members) => members,
            None => return 0,
        };

        let connections = self.connections.read().await;
        let mut delivered = 0;
        for id in members {
            if let Some(sender) = connections.get(id) {
                if let Err(e) = sender.send(event.clone()) {
                    warn!("Failed to broadcast to connection {}: {}", id, e);
                } else {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn room_size(&self, room_id: &str) -> usize {
        self.rooms.read().await.get(room_id).map_or(0, HashSet::len)
    }
}
