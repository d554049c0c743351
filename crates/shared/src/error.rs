//! Error types for DeskRelay

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    #[error("Ticket already exists: {0}")]
    TicketExists(String),
}
