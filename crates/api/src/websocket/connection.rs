//! WebSocket connection management
//!
//! Represents one live chat socket. A connection belongs to exactly one ticket
//! room and owns a bounded outbound queue; the hub closes that queue exactly
//! once when the connection is unregistered, which in turn stops the outbound
//! pump.

use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use super::events::ServerFrame;

/// Sender identity bound via the `identify` frame. Never persisted.
#[derive(Debug, Clone)]
pub struct SenderIdentity {
    pub user_name: String,
    pub user_email: Option<String>,
}

/// Why a frame could not be queued on a connection
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConnectionSendError {
    /// Outbound queue full: the consumer is slow or dead and must be evicted
    #[error("outbound queue full")]
    Full,
    /// Queue already closed (connection unregistered or pump gone)
    #[error("outbound queue closed")]
    Closed,
}

/// An active WebSocket connection
pub struct Connection {
    /// Unique session id for this connection
    pub session_id: Uuid,

    /// The one room this connection belongs to
    pub ticket_id: String,

    /// Bounded outbound queue; `None` once closed
    sender: Mutex<Option<mpsc::Sender<ServerFrame>>>,

    /// Identity bound by the latest `identify` frame
    identity: RwLock<Option<SenderIdentity>>,
}

impl Connection {
    /// Create a connection with a bounded outbound queue.
    ///
    /// Returns the receiving half for the outbound pump.
    pub fn new(ticket_id: String, queue_size: usize) -> (Self, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(queue_size);
        (
            Self {
                session_id: Uuid::new_v4(),
                ticket_id,
                sender: Mutex::new(Some(tx)),
                identity: RwLock::new(None),
            },
            rx,
        )
    }

    /// Queue a frame for this connection without blocking.
    ///
    /// A full queue is reported as `Full` so the hub can evict the slow
    /// consumer instead of stalling the broadcast.
    pub async fn send(&self, frame: ServerFrame) -> Result<(), ConnectionSendError> {
        let sender = self.sender.lock().await;
        match sender.as_ref() {
            Some(tx) => tx.try_send(frame).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ConnectionSendError::Full,
                mpsc::error::TrySendError::Closed(_) => ConnectionSendError::Closed,
            }),
            None => Err(ConnectionSendError::Closed),
        }
    }

    /// Close the outbound queue. Idempotent; returns true only on the first
    /// call so unregister can log the actual close.
    pub async fn close_queue(&self) -> bool {
        let mut sender = self.sender.lock().await;
        sender.take().is_some()
    }

    /// Bind or rebind the sender identity for this connection
    pub async fn identify(&self, identity: SenderIdentity) {
        let mut slot = self.identity.write().await;
        tracing::debug!(
            session_id = %self.session_id,
            ticket_id = %self.ticket_id,
            user_name = %identity.user_name,
            "Connection identified"
        );
        *slot = Some(identity);
    }

    /// Current sender identity, if any
    pub async fn identity(&self) -> Option<SenderIdentity> {
        let slot = self.identity.read().await;
        slot.clone()
    }
}
