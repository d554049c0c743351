//! Cross-service ticket synchronization
//!
//! Both services accept writes for the same ticket, so a message created
//! remotely may not have been forwarded here successfully. The sync worker
//! closes that gap: on a fixed interval it pulls each active ticket's full
//! remote state, merges newly-seen messages into the local store, and
//! re-broadcasts only the recent ones to live viewers.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;

use deskrelay_shared::{MessageStore, StoreError};

use crate::remote::{RemoteClient, RemoteError};
use crate::websocket::{Hub, ServerFrame};

/// Error for a single ticket's sync attempt
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Periodically reconciles local tickets against the counterpart service
pub struct SyncWorker {
    store: Arc<MessageStore>,
    hub: Arc<Hub>,
    remote: Arc<RemoteClient>,
    interval: Duration,
    /// Merged messages younger than this still get broadcast to live viewers;
    /// older ones update history silently
    freshness_window: Duration,
}

impl SyncWorker {
    pub fn new(
        store: Arc<MessageStore>,
        hub: Arc<Hub>,
        remote: Arc<RemoteClient>,
        interval: Duration,
        freshness_window: Duration,
    ) -> Self {
        Self {
            store,
            hub,
            remote,
            interval,
            freshness_window,
        }
    }

    /// Run sync cycles until the shutdown signal flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        // Skip the immediate first tick; the first cycle runs one interval in
        ticker.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            freshness_window_secs = self.freshness_window.as_secs(),
            "Sync worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Sync worker stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One full pass over the active tickets. A single ticket's failure is
    /// logged and skipped; it never aborts the rest of the cycle.
    pub async fn run_cycle(&self) {
        let ticket_ids = self.store.active_ticket_ids().await;
        if ticket_ids.is_empty() {
            return;
        }

        let mut synced = 0usize;
        let mut failed = 0usize;

        for ticket_id in ticket_ids {
            match self.sync_ticket(&ticket_id).await {
                Ok(new_messages) => {
                    synced += 1;
                    if new_messages > 0 {
                        tracing::info!(
                            ticket_id = %ticket_id,
                            new_messages,
                            "Merged remote messages"
                        );
                    }
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        ticket_id = %ticket_id,
                        error = %e,
                        "Failed to sync ticket, skipping until next cycle"
                    );
                }
            }
        }

        tracing::debug!(synced, failed, "Sync cycle complete");
    }

    /// Fetch one ticket's remote state, merge it, and notify live viewers of
    /// messages inside the freshness window
    async fn sync_ticket(&self, ticket_id: &str) -> Result<usize, SyncError> {
        let remote_ticket = self.remote.fetch_ticket(ticket_id).await?;
        let newly_seen = self
            .store
            .merge_remote(ticket_id, remote_ticket.messages)
            .await?;

        if newly_seen.is_empty() {
            return Ok(0);
        }

        let count = newly_seen.len();
        let cutoff = OffsetDateTime::now_utc() - self.freshness_window;

        for message in newly_seen {
            // Older merged messages update history without re-notifying
            // viewers; re-broadcasting them on every cycle would storm clients
            // with duplicate notifications
            if message.created_at < cutoff {
                continue;
            }
            self.hub
                .broadcast(
                    ticket_id,
                    ServerFrame::NewMessage {
                        ticket_id: ticket_id.to_string(),
                        message,
                    },
                )
                .await;
        }

        Ok(count)
    }
}
