//! In-memory ticket and message store
//!
//! Owns the authoritative ordered message list per ticket. Appends are
//! serialized under a store-wide write lock so two concurrent appends to the
//! same ticket can never interleave; readers always get a copy, never a live
//! reference into the store.

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{Message, NewMessage, Ticket};

/// Shared message store
#[derive(Default)]
pub struct MessageStore {
    tickets: RwLock<HashMap<String, Ticket>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            tickets: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new ticket
    pub async fn insert_ticket(&self, ticket: Ticket) -> Result<(), StoreError> {
        let mut tickets = self.tickets.write().await;
        if tickets.contains_key(&ticket.id) {
            return Err(StoreError::TicketExists(ticket.id));
        }

        tracing::info!(ticket_id = %ticket.id, "Ticket created");
        tickets.insert(ticket.id.clone(), ticket);
        Ok(())
    }

    /// Fetch a copy of a full ticket, messages included
    pub async fn ticket(&self, ticket_id: &str) -> Result<Ticket, StoreError> {
        let tickets = self.tickets.read().await;
        tickets
            .get(ticket_id)
            .cloned()
            .ok_or_else(|| StoreError::TicketNotFound(ticket_id.to_string()))
    }

    /// Append a message to a ticket, assigning id and timestamp if absent.
    ///
    /// Returns the stored copy. The whole read-modify-write happens under the
    /// write lock, so appends to one ticket are strictly ordered by lock
    /// acquisition.
    pub async fn append(
        &self,
        ticket_id: &str,
        new_message: NewMessage,
    ) -> Result<Message, StoreError> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(ticket_id)
            .ok_or_else(|| StoreError::TicketNotFound(ticket_id.to_string()))?;

        let message = new_message.into_message(ticket_id);
        ticket.messages.push(message.clone());
        ticket.updated_at = OffsetDateTime::now_utc();

        tracing::debug!(
            ticket_id = %ticket_id,
            message_id = %message.id,
            is_client = message.is_client,
            total_messages = ticket.messages.len(),
            "Message appended"
        );

        Ok(message)
    }

    /// Copy of the ordered message list for a ticket
    pub async fn messages(&self, ticket_id: &str) -> Result<Vec<Message>, StoreError> {
        let tickets = self.tickets.read().await;
        tickets
            .get(ticket_id)
            .map(|t| t.messages.clone())
            .ok_or_else(|| StoreError::TicketNotFound(ticket_id.to_string()))
    }

    /// Merge a remote message list into the local ticket.
    ///
    /// The remote list is adopted wholesale only when it is strictly longer
    /// than the local one (a lagging or regressed remote response is a no-op),
    /// deduplicated by message id. Returns the messages that were not present
    /// locally, in remote order, so the caller can notify live viewers.
    pub async fn merge_remote(
        &self,
        ticket_id: &str,
        remote_messages: Vec<Message>,
    ) -> Result<Vec<Message>, StoreError> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(ticket_id)
            .ok_or_else(|| StoreError::TicketNotFound(ticket_id.to_string()))?;

        if remote_messages.len() <= ticket.messages.len() {
            return Ok(Vec::new());
        }

        let local_ids: HashSet<String> =
            ticket.messages.iter().map(|m| m.id.clone()).collect();

        let mut merged: Vec<Message> = Vec::with_capacity(remote_messages.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(remote_messages.len());
        let mut newly_seen: Vec<Message> = Vec::new();

        for message in remote_messages {
            if !seen.insert(message.id.clone()) {
                continue;
            }
            if !local_ids.contains(&message.id) {
                newly_seen.push(message.clone());
            }
            merged.push(message);
        }

        tracing::info!(
            ticket_id = %ticket_id,
            local_count = ticket.messages.len(),
            remote_count = merged.len(),
            new_messages = newly_seen.len(),
            "Adopted remote message history"
        );

        ticket.messages = merged;
        ticket.updated_at = OffsetDateTime::now_utc();

        Ok(newly_seen)
    }

    /// Bump a ticket's `updated_at` without touching its messages, for
    /// metadata-only writes from the surrounding CRUD layer
    pub async fn touch(&self, ticket_id: &str) -> Result<(), StoreError> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(ticket_id)
            .ok_or_else(|| StoreError::TicketNotFound(ticket_id.to_string()))?;
        ticket.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Ids of all tickets not in a terminal state, for the sync worker
    pub async fn active_ticket_ids(&self) -> Vec<String> {
        let tickets = self.tickets.read().await;
        tickets
            .values()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id.clone())
            .collect()
    }

    /// Total ticket count (for the health endpoint)
    pub async fn ticket_count(&self) -> usize {
        let tickets = self.tickets.read().await;
        tickets.len()
    }
}
