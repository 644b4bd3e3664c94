use crate::protocol::ServerMessage;
use axum::extract::ws::Utf8Bytes;
use log::{debug, warn};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Outbound half of one observer connection. The socket writer task owns
/// the receiving end.
pub type Outbox = UnboundedSender<Utf8Bytes>;

/// Open connections. Delivery is fire-and-forget: a closed outbox is pruned
/// and never holds up the others.
#[derive(Debug, Default)]
pub struct Registry {
    connections: Mutex<HashMap<ConnectionId, Outbox>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, outbox: Outbox) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.lock().await.insert(id, outbox);
        id
    }

    pub async fn unregister(&self, id: ConnectionId) -> bool {
        self.connections.lock().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Point-to-point send. Returns whether the frame was queued.
    pub async fn send_to(&self, id: ConnectionId, message: &ServerMessage<'_>) -> bool {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode {} for {}: {}", message.kind(), id, e);
                return false;
            }
        };

        let mut connections = self.connections.lock().await;
        let Some(outbox) = connections.get(&id) else {
            return false;
        };
        if outbox.send(frame).is_err() {
            debug!("Connection {} closed before {} could be sent", id, message.kind());
            connections.remove(&id);
            return false;
        }
        true
    }

    /// Serializes `message` once and queues it for every open connection.
    /// Returns the number of connections it reached.
    pub async fn broadcast(&self, message: &ServerMessage<'_>) -> usize {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode {} for broadcast: {}", message.kind(), e);
                return 0;
            }
        };

        let mut connections = self.connections.lock().await;
        let mut closed = Vec::new();
        let mut delivered = 0;
        for (id, outbox) in connections.iter() {
            if outbox.is_closed() || outbox.send(frame.clone()).is_err() {
                closed.push(*id);
                continue;
            }
            delivered += 1;
        }

        for id in closed {
            debug!("Pruning closed connection {} during {} broadcast", id, message.kind());
            connections.remove(&id);
        }
        delivered
    }
}
