//! Ticket and message endpoints
//!
//! The narrow HTTP surface the core exposes: ticket intake, full-ticket fetch
//! (the counterpart's sync source), message listing, and message append. The
//! append endpoint doubles as the receiving end of cross-service forwarding;
//! provenance comes in on the `X-Message-Source` header.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use deskrelay_shared::{
    Message, MessageSource, NewMessage, Ticket, TicketPriority, TicketStatus,
};

use crate::error::{ApiError, ApiResult};
use crate::remote::MESSAGE_SOURCE_HEADER;
use crate::state::AppState;
use crate::websocket::ServerFrame;

// =============================================================================
// Intake
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    pub name: String,
    pub email: String,
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketResponse {
    pub ticket_id: String,
    pub message: String,
}

/// Create a ticket with its first client message (widget intake)
pub async fn create_ticket(
    State(state): State<AppState>,
    Json(req): Json<CreateTicketRequest>,
) -> ApiResult<(StatusCode, Json<CreateTicketResponse>)> {
    if req.message.trim().is_empty() {
        return Err(ApiError::Validation("Message must not be empty".to_string()));
    }

    let now = OffsetDateTime::now_utc();
    let ticket_id = Ticket::generate_id(now);

    let ticket = Ticket {
        id: ticket_id.clone(),
        title: req
            .title
            .unwrap_or_else(|| format!("Support request from {}", req.name)),
        status: TicketStatus::New,
        priority: TicketPriority::default(),
        category: req.category,
        customer_name: req.name.clone(),
        customer_email: req.email.clone(),
        assigned_to: None,
        created_at: now,
        updated_at: now,
        messages: Vec::new(),
    };
    state.store.insert_ticket(ticket).await?;

    let first_message = state
        .store
        .append(
            &ticket_id,
            NewMessage {
                content: req.message,
                is_client: true,
                user_name: Some(req.name),
                user_email: Some(req.email),
                source: Some(state.config.service_origin),
                ..Default::default()
            },
        )
        .await?;

    // No viewers can exist yet, so there is nothing to broadcast; the
    // counterpart still needs the opening message
    state.forwarder.spawn_forward(first_message).await;

    tracing::info!(ticket_id = %ticket_id, "Ticket created via intake");

    Ok((
        StatusCode::CREATED,
        Json(CreateTicketResponse {
            ticket_id,
            message: "Ticket created successfully".to_string(),
        }),
    ))
}

// =============================================================================
// Fetch
// =============================================================================

/// Full ticket representation, metadata plus ordered message list.
/// This is what the counterpart's sync worker pulls.
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
) -> ApiResult<Json<Ticket>> {
    let ticket = state.store.ticket(&ticket_id).await?;
    Ok(Json(ticket))
}

/// Ordered message list for a ticket
pub async fn get_messages(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state.store.messages(&ticket_id).await?;
    Ok(Json(messages))
}

// =============================================================================
// Append
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub is_client: bool,
    #[serde(default)]
    pub is_internal: bool,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

/// Append a message to a ticket.
///
/// Serves both direct writes (agent dashboard, REST clients) and forwarded
/// messages from the counterpart service. Forwarded messages keep the id and
/// timestamp their originating service assigned, and are never forwarded
/// onward.
pub async fn append_message(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AppendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Content must not be empty".to_string()));
    }

    let source = match headers.get(MESSAGE_SOURCE_HEADER) {
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("Invalid message source header".to_string()))?;
            let parsed: MessageSource = raw
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("Unknown message source: {raw}")))?;
            parsed
        }
        // No provenance header: this is a direct local write
        None => state.config.service_origin,
    };

    let stored = state
        .store
        .append(
            &ticket_id,
            NewMessage {
                id: req.id,
                content: req.content,
                is_client: req.is_client,
                is_internal: req.is_internal,
                user_name: req.user_name,
                user_email: req.user_email,
                source: Some(source),
                created_at: req.created_at,
            },
        )
        .await?;

    // Internal notes stay invisible to the chat channel and the counterpart
    if !stored.is_internal {
        state
            .hub
            .broadcast(
                &ticket_id,
                ServerFrame::NewMessage {
                    ticket_id: ticket_id.clone(),
                    message: stored.clone(),
                },
            )
            .await;
        // Forwarder skips anything that did not originate here
        state.forwarder.spawn_forward(stored.clone()).await;
    }

    tracing::info!(
        ticket_id = %ticket_id,
        message_id = %stored.id,
        source = %source,
        is_client = stored.is_client,
        "Message appended via API"
    );

    Ok((StatusCode::CREATED, Json(stored)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::Config;
    use crate::websocket::Connection;

    fn test_config(remote_url: &str, origin: MessageSource) -> Config {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            remote_base_url: remote_url.to_string(),
            service_origin: origin,
            sync_interval_secs: 30,
            freshness_window_secs: 300,
            forward_max_attempts: 1,
            forward_timeout_secs: 2,
            outbound_queue_size: 16,
        }
    }

    fn seeded_ticket(id: &str) -> Ticket {
        let now = OffsetDateTime::now_utc();
        Ticket {
            id: id.to_string(),
            title: "Login problem".to_string(),
            status: TicketStatus::Open,
            priority: Default::default(),
            category: None,
            customer_name: "Cliente".to_string(),
            customer_email: "cliente@example.com".to_string(),
            assigned_to: None,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    fn append_request(content: &str) -> AppendMessageRequest {
        AppendMessageRequest {
            content: content.to_string(),
            id: None,
            is_client: false,
            is_internal: false,
            user_name: None,
            user_email: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_forwarded_message_is_stored_but_not_reforwarded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/tickets/TICKET-1/messages")
            .expect(0)
            .create_async()
            .await;

        let state =
            AppState::new(test_config(&server.url(), MessageSource::Widget)).unwrap();
        state.store.insert_ticket(seeded_ticket("TICKET-1")).await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(MESSAGE_SOURCE_HEADER, "backend".parse().unwrap());

        let mut req = append_request("agent reply");
        req.id = Some("m-remote".to_string());

        let (status, Json(stored)) = append_message(
            State(state.clone()),
            Path("TICKET-1".to_string()),
            headers,
            Json(req),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(stored.id, "m-remote");
        assert_eq!(stored.source, Some(MessageSource::Backend));

        // Provenance says backend; a widget deployment must not bounce it back
        state.forwarder.shutdown(Duration::from_secs(1)).await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_internal_note_is_not_broadcast() {
        let server = mockito::Server::new_async().await;
        let state =
            AppState::new(test_config(&server.url(), MessageSource::Backend)).unwrap();
        state.store.insert_ticket(seeded_ticket("TICKET-1")).await.unwrap();

        let (conn, mut rx) = Connection::new("TICKET-1".to_string(), 16);
        state.hub.register(Arc::new(conn)).await;

        let mut internal = append_request("internal note");
        internal.is_internal = true;
        append_message(
            State(state.clone()),
            Path("TICKET-1".to_string()),
            HeaderMap::new(),
            Json(internal),
        )
        .await
        .unwrap();
        assert!(rx.try_recv().is_err());

        append_message(
            State(state.clone()),
            Path("TICKET-1".to_string()),
            HeaderMap::new(),
            Json(append_request("visible reply")),
        )
        .await
        .unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerFrame::NewMessage { .. })
        ));

        // Both writes landed in the store regardless of visibility
        assert_eq!(state.store.messages("TICKET-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_to_unknown_ticket_is_not_found() {
        let server = mockito::Server::new_async().await;
        let state =
            AppState::new(test_config(&server.url(), MessageSource::Backend)).unwrap();

        let result = append_message(
            State(state),
            Path("TICKET-MISSING".to_string()),
            HeaderMap::new(),
            Json(append_request("hello")),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn test_unknown_provenance_header_is_rejected() {
        let server = mockito::Server::new_async().await;
        let state =
            AppState::new(test_config(&server.url(), MessageSource::Widget)).unwrap();
        state.store.insert_ticket(seeded_ticket("TICKET-1")).await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(MESSAGE_SOURCE_HEADER, "dashboard".parse().unwrap());

        let result = append_message(
            State(state),
            Path("TICKET-1".to_string()),
            headers,
            Json(append_request("hello")),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_create_ticket_forwards_opening_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                mockito::Matcher::Regex(r"^/api/tickets/TICKET-\d{14}/messages$".to_string()),
            )
            .with_status(201)
            .expect(1)
            .create_async()
            .await;

        let state =
            AppState::new(test_config(&server.url(), MessageSource::Widget)).unwrap();

        let (status, Json(response)) = create_ticket(
            State(state.clone()),
            Json(CreateTicketRequest {
                name: "Cliente".to_string(),
                email: "cliente@example.com".to_string(),
                message: "No puedo entrar".to_string(),
                title: None,
                category: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert!(response.ticket_id.starts_with("TICKET-"));

        let messages = state.store.messages(&response.ticket_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_client);
        assert_eq!(messages[0].source, Some(MessageSource::Widget));

        state.forwarder.shutdown(Duration::from_secs(2)).await;
        mock.assert_async().await;
    }
}
