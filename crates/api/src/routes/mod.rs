//! API routes

pub mod health;
pub mod tickets;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::websocket::ws_handler;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness));

    // Ticket REST routes. The message POST doubles as the receiving end of
    // cross-service forwarding; the GET ticket route is the sync worker's
    // fetch target on the counterpart side.
    let ticket_routes = Router::new()
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets/:ticket_id", get(tickets::get_ticket))
        .route(
            "/tickets/:ticket_id/messages",
            get(tickets::get_messages).post(tickets::append_message),
        );

    // WebSocket routes (one chat room per ticket)
    let websocket_routes = Router::new().route("/ws/chat/:ticket_id", get(ws_handler));

    let api_routes = Router::new().merge(ticket_routes).merge(websocket_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        // The widget runs on customer domains, so the chat endpoints must
        // answer cross-origin requests
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
