//! Ticket room registry and broadcast
//!
//! The hub owns the mapping from ticket id to the set of live connections
//! ("rooms"). It is constructed once and handed to handlers through
//! `AppState`; room membership is only ever mutated through `register`,
//! `unregister` and the eviction path of `broadcast`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::connection::{Connection, ConnectionSendError};
use super::events::ServerFrame;

/// Registry of live connections, grouped into per-ticket rooms
#[derive(Default)]
pub struct Hub {
    rooms: RwLock<HashMap<String, Vec<Arc<Connection>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection to the room for its ticket, creating the room if
    /// absent
    pub async fn register(&self, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(conn.ticket_id.clone()).or_default();
        room.push(Arc::clone(&conn));

        tracing::debug!(
            ticket_id = %conn.ticket_id,
            session_id = %conn.session_id,
            room_size = room.len(),
            "Connection joined ticket room"
        );
    }

    /// Remove a connection from its room and close its outbound queue.
    ///
    /// Calling this twice for the same connection is a no-op the second time;
    /// the queue is closed exactly once. The room is deleted when its last
    /// member leaves.
    pub async fn unregister(&self, conn: &Connection) {
        let mut removed = false;
        {
            let mut rooms = self.rooms.write().await;
            if let Some(room) = rooms.get_mut(&conn.ticket_id) {
                let before = room.len();
                room.retain(|c| c.session_id != conn.session_id);
                removed = room.len() < before;

                if room.is_empty() {
                    rooms.remove(&conn.ticket_id);
                    tracing::debug!(
                        ticket_id = %conn.ticket_id,
                        "Removed empty ticket room"
                    );
                }
            }
        }

        // Queue close happens outside the membership lock; idempotent
        let closed_now = conn.close_queue().await;

        if removed || closed_now {
            tracing::debug!(
                ticket_id = %conn.ticket_id,
                session_id = %conn.session_id,
                "Connection left ticket room"
            );
        }
    }

    /// Deliver a frame to every connection in a ticket room.
    ///
    /// Delivery is non-blocking per connection: a member whose queue is full
    /// or already closed is evicted after the membership lock is released, so
    /// one slow consumer can never stall the broadcaster or other recipients.
    /// A broadcast to an absent room is a silent no-op.
    pub async fn broadcast(&self, ticket_id: &str, frame: ServerFrame) {
        let mut evicted: Vec<Arc<Connection>> = Vec::new();
        let mut delivered = 0usize;

        {
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(ticket_id) else {
                return; // no viewers currently watching this ticket
            };

            for conn in room {
                match conn.send(frame.clone()).await {
                    Ok(()) => delivered += 1,
                    Err(ConnectionSendError::Full) => {
                        tracing::warn!(
                            ticket_id = %ticket_id,
                            session_id = %conn.session_id,
                            "Outbound queue full, evicting slow consumer"
                        );
                        evicted.push(Arc::clone(conn));
                    }
                    Err(ConnectionSendError::Closed) => {
                        evicted.push(Arc::clone(conn));
                    }
                }
            }
        }

        for conn in &evicted {
            self.unregister(conn).await;
        }

        tracing::debug!(
            ticket_id = %ticket_id,
            recipients = delivered,
            evicted = evicted.len(),
            "Broadcast frame to ticket room"
        );
    }

    /// Close every connection's queue and clear all rooms (shutdown path)
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Connection>> = {
            let mut rooms = self.rooms.write().await;
            rooms.drain().flat_map(|(_, room)| room).collect()
        };

        for conn in &drained {
            conn.close_queue().await;
        }

        if !drained.is_empty() {
            tracing::info!(connections = drained.len(), "Closed all ticket rooms");
        }
    }

    /// Number of connections in a ticket room
    pub async fn room_size(&self, ticket_id: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(ticket_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Number of active rooms
    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }

    /// Total live connections across all rooms
    pub async fn connection_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.values().map(|r| r.len()).sum()
    }
}
