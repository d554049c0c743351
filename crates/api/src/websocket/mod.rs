//! WebSocket support for real-time chat
//!
//! One logical channel per ticket id. Provides:
//! - **Connection**: one live chat socket with a bounded outbound queue
//! - **Hub**: the registry of per-ticket rooms, broadcast and eviction
//! - **Handler**: Axum WebSocket route handler running the two pumps
//! - **Events**: the closed set of client/server frame types

pub mod connection;
pub mod events;
pub mod handler;
pub mod hub;

pub use connection::Connection;
pub use events::{ClientFrame, ServerFrame};
pub use handler::ws_handler;
pub use hub::Hub;
