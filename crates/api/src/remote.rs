//! HTTP client for the counterpart service
//!
//! The widget intake service and the agent backend each expose the same
//! narrow ticket surface; this client covers the two calls the core needs:
//! fetching a full remote ticket (sync) and forwarding a message.

use std::time::Duration;

use deskrelay_shared::{Message, MessageSource, Ticket};

/// Header carrying the ticket id on forwarded messages
pub const TICKET_ID_HEADER: &str = "X-Ticket-ID";

/// Header carrying the provenance marker on forwarded messages
pub const MESSAGE_SOURCE_HEADER: &str = "X-Message-Source";

/// Error type for remote calls
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned status {status}")]
    Status { status: reqwest::StatusCode },

    #[error("Invalid response from remote: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Returns true if this error is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            // Network-level failures and timeouts may clear up
            RemoteError::Http(_) => true,
            // Server-side failures may clear up; client errors will not
            RemoteError::Status { status } => status.is_server_error(),
            RemoteError::Decode(_) => false,
        }
    }
}

/// Client for the counterpart DeskRelay service
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    origin: MessageSource,
}

impl RemoteClient {
    /// Build a client with a per-request timeout. `base_url` has no trailing
    /// slash.
    pub fn new(
        base_url: &str,
        origin: MessageSource,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            origin,
        })
    }

    /// Fetch the full remote representation of a ticket (metadata + ordered
    /// message list)
    pub async fn fetch_ticket(&self, ticket_id: &str) -> Result<Ticket, RemoteError> {
        let url = format!("{}/api/tickets/{}", self.base_url, ticket_id);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status { status });
        }

        response
            .json::<Ticket>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    /// Forward a locally-created message to the counterpart service, tagged
    /// with this service's provenance marker
    pub async fn forward_message(&self, message: &Message) -> Result<(), RemoteError> {
        let url = format!("{}/api/tickets/{}/messages", self.base_url, message.ticket_id);
        let response = self
            .http
            .post(&url)
            .header(TICKET_ID_HEADER, &message.ticket_id)
            .header(MESSAGE_SOURCE_HEADER, self.origin.as_str())
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status { status });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskrelay_shared::NewMessage;

    fn message(ticket_id: &str) -> Message {
        NewMessage {
            content: "hello from the widget".to_string(),
            is_client: true,
            source: Some(MessageSource::Widget),
            ..Default::default()
        }
        .into_message(ticket_id)
    }

    #[tokio::test]
    async fn test_forward_message_sets_provenance_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/tickets/TICKET-1/messages")
            .match_header(TICKET_ID_HEADER, "TICKET-1")
            .match_header(MESSAGE_SOURCE_HEADER, "widget")
            .with_status(201)
            .create_async()
            .await;

        let client = RemoteClient::new(
            &server.url(),
            MessageSource::Widget,
            Duration::from_secs(2),
        )
        .unwrap();

        client.forward_message(&message("TICKET-1")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_ticket_decodes_full_ticket() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tickets/TICKET-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "id": "TICKET-1",
                    "title": "Login problem",
                    "status": "open",
                    "priority": "medium",
                    "customerName": "Cliente",
                    "customerEmail": "cliente@example.com",
                    "createdAt": "2025-01-14T09:30:22Z",
                    "updatedAt": "2025-01-14T09:31:22Z",
                    "messages": [
                        {
                            "id": "m1",
                            "ticketId": "TICKET-1",
                            "content": "hola",
                            "isClient": true,
                            "createdAt": "2025-01-14T09:30:25Z"
                        }
                    ]
                }"#,
            )
            .create_async()
            .await;

        let client = RemoteClient::new(
            &server.url(),
            MessageSource::Backend,
            Duration::from_secs(2),
        )
        .unwrap();

        let ticket = client.fetch_ticket("TICKET-1").await.unwrap();
        assert_eq!(ticket.id, "TICKET-1");
        assert_eq!(ticket.messages.len(), 1);
        assert!(ticket.messages[0].is_client);
    }

    #[tokio::test]
    async fn test_status_errors_split_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tickets/TICKET-1")
            .with_status(503)
            .create_async()
            .await;

        let client = RemoteClient::new(
            &server.url(),
            MessageSource::Backend,
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client.fetch_ticket("TICKET-1").await.unwrap_err();
        assert!(err.is_transient());

        let not_found = RemoteError::Status {
            status: reqwest::StatusCode::NOT_FOUND,
        };
        assert!(!not_found.is_transient());
    }
}
