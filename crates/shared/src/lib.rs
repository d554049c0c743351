//! DeskRelay Shared Types and Store
//!
//! This crate contains the domain types and the in-memory message store shared
//! across the DeskRelay services (widget intake and agent backend).

pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::MessageStore;
pub use types::*;
