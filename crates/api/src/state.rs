//! Shared application state
//!
//! One explicitly-constructed instance of each core component, handed to
//! handlers via axum's `State` extractor. Nothing here is a package-level
//! singleton; tests build their own `AppState` against mock remotes.

use std::sync::Arc;

use deskrelay_shared::MessageStore;

use crate::config::Config;
use crate::forward::Forwarder;
use crate::remote::RemoteClient;
use crate::websocket::Hub;

/// Application state shared across all handlers and background tasks
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<MessageStore>,
    pub hub: Arc<Hub>,
    pub remote: Arc<RemoteClient>,
    pub forwarder: Arc<Forwarder>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let remote = Arc::new(RemoteClient::new(
            &config.remote_base_url,
            config.service_origin,
            config.forward_timeout(),
        )?);
        let forwarder = Arc::new(Forwarder::new(
            Arc::clone(&remote),
            config.service_origin,
            config.forward_max_attempts,
        ));

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(MessageStore::new()),
            hub: Arc::new(Hub::new()),
            remote,
            forwarder,
        })
    }
}
