//! WebSocket handler for Axum
//!
//! Upgrades `/api/ws/chat/:ticket_id`, registers the connection with the hub,
//! replays history, and runs the two per-connection pumps. Either pump failing
//! stops its sibling, closes the socket, and unregisters the connection
//! exactly once.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};

use deskrelay_shared::NewMessage;

use crate::state::AppState;

use super::{
    connection::{Connection, SenderIdentity},
    events::{ClientFrame, ServerFrame},
};

/// Time allowed to write one frame to the peer
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between reads from the peer; any inbound traffic (pong
/// included) refreshes the deadline
const PONG_WAIT: Duration = Duration::from_secs(60);

/// Ping the peer with this period; must be shorter than `PONG_WAIT`
const PING_PERIOD: Duration = Duration::from_secs(54);

/// WebSocket handler - upgrades the HTTP connection for one ticket's chat
/// channel
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(ticket_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, StatusCode> {
    // The channel is per ticket; refuse upgrades for tickets we do not know
    if state.store.ticket(&ticket_id).await.is_err() {
        tracing::warn!(ticket_id = %ticket_id, "WebSocket upgrade refused: unknown ticket");
        return Err(StatusCode::NOT_FOUND);
    }

    tracing::info!(ticket_id = %ticket_id, "WebSocket connection upgrade requested");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, ticket_id, state)))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, ticket_id: String, state: AppState) {
    let (sink, stream) = socket.split();
    run_connection(sink, stream, ticket_id, state).await;
}

/// Run both pumps for one connection until either exits.
///
/// The outbound pump runs as its own task; the inbound loop races it under
/// `tokio::select!`, so a write failure or a hub eviction (queue closed) stops
/// the read loop immediately instead of letting an unregistered connection
/// keep accepting frames. The connection is unregistered exactly once on the
/// way out, whichever pump exits first.
async fn run_connection<Si, St>(mut sink: Si, mut stream: St, ticket_id: String, state: AppState)
where
    Si: Sink<WsMessage> + Unpin + Send + 'static,
    Si::Error: Send,
    St: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    let (conn, rx) = Connection::new(ticket_id.clone(), state.config.outbound_queue_size);
    let conn = Arc::new(conn);
    let session_id = conn.session_id;

    state.hub.register(Arc::clone(&conn)).await;

    // Acknowledge the connection before anything else
    let _ = conn
        .send(ServerFrame::ConnectionEstablished {
            session_id,
            ticket_id: ticket_id.clone(),
        })
        .await;

    // Replay the current message history to the newly-registered viewer
    match state.store.messages(&ticket_id).await {
        Ok(messages) => {
            let count = messages.len();
            let _ = conn
                .send(ServerFrame::MessageHistory {
                    ticket_id: ticket_id.clone(),
                    messages,
                    count,
                })
                .await;
        }
        Err(e) => {
            tracing::error!(ticket_id = %ticket_id, error = %e, "Failed to load message history");
        }
    }

    // Outbound pump: drains the queue and keeps the socket alive with pings
    let mut send_task = tokio::spawn({
        let ticket_id = ticket_id.clone();
        async move {
            let mut rx = rx;
            let mut ping = tokio::time::interval(PING_PERIOD);
            // The first tick fires immediately; consume it so pings start one
            // period after connect
            ping.tick().await;

            loop {
                tokio::select! {
                    maybe_frame = rx.recv() => {
                        let Some(frame) = maybe_frame else {
                            // Queue closed by the hub; tell the peer we're done
                            let _ = sink.send(WsMessage::Close(None)).await;
                            break;
                        };
                        let json = match serde_json::to_string(&frame) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to serialize WebSocket frame");
                                continue;
                            }
                        };
                        match tokio::time::timeout(WRITE_WAIT, sink.send(WsMessage::Text(json))).await {
                            Ok(Ok(())) => {}
                            _ => break, // write error or deadline exceeded
                        }
                    }
                    _ = ping.tick() => {
                        match tokio::time::timeout(WRITE_WAIT, sink.send(WsMessage::Ping(Vec::new()))).await {
                            Ok(Ok(())) => {}
                            _ => break,
                        }
                    }
                }
            }
            tracing::debug!(ticket_id = %ticket_id, session_id = %session_id, "Outbound pump stopped");
        }
    });

    // Race the inbound loop against the outbound pump so either exit stops
    // its sibling
    let outbound_exited_first = tokio::select! {
        _ = &mut send_task => true,
        _ = read_frames(&mut stream, &conn, &ticket_id, &state) => false,
    };

    tracing::info!(
        ticket_id = %ticket_id,
        session_id = %session_id,
        outbound_exited_first,
        "WebSocket connection closing"
    );
    state.hub.unregister(&conn).await;
    if !outbound_exited_first {
        // Unregister closed the queue; let the pump drain and send the close
        // frame before we drop the connection
        let _ = send_task.await;
    }
}

/// Inbound pump: blocks on socket reads under a rolling deadline. Returns when
/// the peer closes, a read fails, or the deadline lapses.
async fn read_frames<St>(
    stream: &mut St,
    conn: &Arc<Connection>,
    ticket_id: &str,
    state: &AppState,
) where
    St: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    loop {
        let next = tokio::time::timeout(PONG_WAIT, stream.next()).await;
        let msg = match next {
            Err(_) => {
                tracing::info!(
                    ticket_id = %ticket_id,
                    session_id = %conn.session_id,
                    "Read deadline exceeded, closing connection"
                );
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                tracing::debug!(session_id = %conn.session_id, error = %e, "WebSocket read error");
                return;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            WsMessage::Text(text) => {
                handle_client_frame(&text, conn, ticket_id, state).await;
            }
            WsMessage::Close(_) => {
                tracing::info!(session_id = %conn.session_id, "WebSocket close frame received");
                return;
            }
            // Any pong (or unsolicited ping) counts as liveness; the deadline
            // was already refreshed by this read. Axum answers pings itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            _ => {} // ignore binary frames
        }
    }
}

/// Decode and dispatch one inbound text frame
async fn handle_client_frame(text: &str, conn: &Arc<Connection>, ticket_id: &str, state: &AppState) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(
                session_id = %conn.session_id,
                error = %e,
                "Failed to parse client frame"
            );
            // Structured error reply to this connection only; stay open
            let _ = conn
                .send(ServerFrame::Error {
                    message: "Invalid frame format".to_string(),
                })
                .await;
            return;
        }
    };

    match frame {
        ClientFrame::Identify {
            user_name,
            user_email,
        } => {
            conn.identify(SenderIdentity {
                user_name,
                user_email,
            })
            .await;
        }

        ClientFrame::NewMessage { content } => {
            let identity = conn.identity().await;
            let new_message = NewMessage {
                content,
                // The widget's chat peers are customers; the backend's are
                // agents
                is_client: state.config.service_origin == deskrelay_shared::MessageSource::Widget,
                user_name: identity.as_ref().map(|i| i.user_name.clone()),
                user_email: identity.and_then(|i| i.user_email),
                source: Some(state.config.service_origin),
                ..Default::default()
            };

            let stored = match state.store.append(ticket_id, new_message).await {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::error!(ticket_id = %ticket_id, error = %e, "Failed to store chat message");
                    let _ = conn
                        .send(ServerFrame::Error {
                            message: "Failed to store message".to_string(),
                        })
                        .await;
                    return;
                }
            };

            // Local viewers first, then relay to the counterpart service
            state
                .hub
                .broadcast(
                    ticket_id,
                    ServerFrame::NewMessage {
                        ticket_id: ticket_id.to_string(),
                        message: stored.clone(),
                    },
                )
                .await;
            state.forwarder.spawn_forward(stored).await;
        }

        ClientFrame::Ping => {
            let _ = conn.send(ServerFrame::Pong).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    use crate::config::Config;
    use deskrelay_shared::{MessageSource, Ticket, TicketStatus};

    fn test_state(remote_url: &str) -> AppState {
        AppState::new(Config {
            bind_address: "127.0.0.1:0".to_string(),
            remote_base_url: remote_url.to_string(),
            service_origin: MessageSource::Widget,
            sync_interval_secs: 30,
            freshness_window_secs: 300,
            forward_max_attempts: 1,
            forward_timeout_secs: 2,
            outbound_queue_size: 16,
        })
        .unwrap()
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

    /// A sink whose peer is gone: every write fails immediately
    fn dead_sink() -> futures::channel::mpsc::Sender<WsMessage> {
        let (tx, rx) = futures::channel::mpsc::channel::<WsMessage>(1);
        drop(rx);
        tx
    }

    #[tokio::test]
    async fn test_outbound_failure_stops_inbound_pump() {
        let server = mockito::Server::new_async().await;
        let state = test_state(&server.url());
        state.store.insert_ticket(seeded_ticket("TICKET-1")).await.unwrap();

        // The peer never sends anything; without the sibling teardown the
        // read loop would sit on its 60s deadline long past this test's
        // budget. The dead sink kills the outbound pump on the first write.
        let stream = futures::stream::pending::<Result<WsMessage, axum::Error>>();

        tokio::time::timeout(
            Duration::from_secs(5),
            run_connection(
                dead_sink(),
                stream,
                "TICKET-1".to_string(),
                state.clone(),
            ),
        )
        .await
        .expect("inbound pump must stop when the outbound pump dies");

        // Teardown unregistered the connection and removed the empty room
        assert_eq!(state.hub.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_peer_ignoring_close_cannot_keep_connection_alive() {
        let server = mockito::Server::new_async().await;
        let state = test_state(&server.url());
        state.store.insert_ticket(seeded_ticket("TICKET-1")).await.unwrap();

        // A peer that ignores the close handshake and keeps sending chat
        // frames forever; each read refreshes the inbound deadline
        let stream = futures::stream::repeat_with(|| {
            Ok(WsMessage::Text(
                r#"{"type":"new_message","content":"hola"}"#.to_string(),
            ))
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            run_connection(
                dead_sink(),
                Box::pin(stream),
                "TICKET-1".to_string(),
                state.clone(),
            ),
        )
        .await
        .expect("a chatty peer must not outlive its dead outbound pump");

        assert_eq!(state.hub.room_count().await, 0);
        state.forwarder.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_peer_close_frame_ends_connection() {
        let server = mockito::Server::new_async().await;
        let state = test_state(&server.url());
        state.store.insert_ticket(seeded_ticket("TICKET-1")).await.unwrap();

        // Healthy sink this time; the peer closes cleanly after one message
        let (sink, _rx) = futures::channel::mpsc::channel::<WsMessage>(64);
        let frames = vec![
            Ok(WsMessage::Text(
                r#"{"type":"new_message","content":"adios"}"#.to_string(),
            )),
            Ok(WsMessage::Close(None)),
        ];
        let stream = futures::stream::iter(frames);

        tokio::time::timeout(
            Duration::from_secs(5),
            run_connection(sink, stream, "TICKET-1".to_string(), state.clone()),
        )
        .await
        .expect("close frame must end the connection");

        assert_eq!(state.hub.room_count().await, 0);
        assert_eq!(state.store.messages("TICKET-1").await.unwrap().len(), 1);
        state.forwarder.shutdown(Duration::from_secs(1)).await;
    }
}
