//! Common types used across DeskRelay
//!
//! Ticket and message records travel between the widget intake service and the
//! agent backend, so their wire shape (camelCase JSON, RFC 3339 timestamps) is
//! part of the cross-service protocol and must stay stable.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Provenance
// =============================================================================

/// Which service a message originated from.
///
/// Carried as the `X-Message-Source` header when a message is forwarded to the
/// counterpart service, and stored on the message itself so forwarding loops
/// and sync re-imports can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    /// The customer-facing widget intake service
    Widget,
    /// The agent-facing backend service
    Backend,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Widget => "widget",
            Self::Backend => "backend",
        }
    }
}

impl std::fmt::Display for MessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "widget" => Ok(Self::Widget),
            "backend" => Ok(Self::Backend),
            other => Err(format!("unknown message source: {other}")),
        }
    }
}

// =============================================================================
// Tickets
// =============================================================================

/// Ticket lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    Open,
    AwaitingResponse,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Terminal tickets are excluded from sync cycles
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Ticket priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for TicketPriority {
    fn default() -> Self {
        Self::Medium
    }
}

/// A support ticket with its ordered message history.
///
/// Ticket ids are stable, globally unique strings minted by whichever service
/// first created the ticket (e.g. `TICKET-20250114093022`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Append-only on the hot path; order is never retroactively reshuffled
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Ticket {
    /// Mint a ticket id in the cross-service format
    pub fn generate_id(now: OffsetDateTime) -> String {
        format!(
            "TICKET-{:04}{:02}{:02}{:02}{:02}{:02}",
            now.year(),
            u8::from(now.month()),
            now.day(),
            now.hour(),
            now.minute(),
            now.second()
        )
    }
}

// =============================================================================
// Messages
// =============================================================================

/// One chat message inside a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub ticket_id: String,
    pub content: String,
    /// True when the author is the customer, false for agent replies
    pub is_client: bool,
    /// Internal notes are hidden from customers
    #[serde(default)]
    pub is_internal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    /// Provenance marker; not serialized to customers, but carried across the
    /// forwarding channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MessageSource>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Input for `MessageStore::append`.
///
/// Id and timestamp are optional: a direct write leaves them empty and the
/// store assigns them, while a forwarded message arrives with the values the
/// originating service already assigned.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub id: Option<String>,
    pub content: String,
    pub is_client: bool,
    pub is_internal: bool,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub source: Option<MessageSource>,
    pub created_at: Option<OffsetDateTime>,
}

impl NewMessage {
    /// Materialize the stored message, filling in id and timestamp if absent
    pub fn into_message(self, ticket_id: &str) -> Message {
        Message {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            ticket_id: ticket_id.to_string(),
            content: self.content,
            is_client: self.is_client,
            is_internal: self.is_internal,
            user_name: self.user_name,
            user_email: self.user_email,
            source: self.source,
            created_at: self.created_at.unwrap_or_else(OffsetDateTime::now_utc),
        }
    }
}
