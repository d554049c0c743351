//! DeskRelay API Library
//!
//! This crate contains the server components for a DeskRelay deployment:
//! the per-ticket WebSocket hub, the ticket REST surface, and the two
//! cross-service channels (forwarding and periodic sync).

pub mod config;
pub mod error;
pub mod forward;
pub mod remote;
pub mod routes;
pub mod state;
pub mod sync;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
