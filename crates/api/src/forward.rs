//! Outbound message forwarder
//!
//! Relays locally-created messages to the counterpart service. Forwarding is
//! fire-and-forget from the caller's point of view: the local append has
//! already succeeded, so retry exhaustion is logged and never surfaced.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use deskrelay_shared::Message;

use crate::remote::{RemoteClient, RemoteError};

/// Initial backoff between forward attempts
const RETRY_BASE_DELAY: Duration = Duration::from_millis(300);

/// Cap on the backoff between forward attempts
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Forwards messages to the counterpart service with bounded retries
pub struct Forwarder {
    remote: Arc<RemoteClient>,
    /// Total attempts per message, first try included
    max_attempts: usize,
    /// Local service provenance; messages from elsewhere are never re-forwarded
    origin: deskrelay_shared::MessageSource,
    tasks: Mutex<JoinSet<()>>,
}

impl Forwarder {
    pub fn new(
        remote: Arc<RemoteClient>,
        origin: deskrelay_shared::MessageSource,
        max_attempts: usize,
    ) -> Self {
        Self {
            remote,
            max_attempts: max_attempts.max(1),
            origin,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Relay a locally-appended message asynchronously.
    ///
    /// Messages that did not originate here (arrived via forwarding or a sync
    /// merge) are skipped, which is what breaks the forward/sync loop between
    /// the two services.
    pub async fn spawn_forward(&self, message: Message) {
        if message.source != Some(self.origin) {
            tracing::debug!(
                ticket_id = %message.ticket_id,
                message_id = %message.id,
                source = ?message.source,
                "Skipping forward of non-local message"
            );
            return;
        }

        let remote = Arc::clone(&self.remote);
        let max_attempts = self.max_attempts;

        let mut tasks = self.tasks.lock().await;
        // Reap finished forwards so the set does not grow unbounded
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            forward_with_retry(&remote, &message, max_attempts).await;
        });
    }

    /// Wait up to `grace` for in-flight forwards, then abandon the rest
    pub async fn shutdown(&self, grace: Duration) {
        let mut tasks = self.tasks.lock().await;
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                abandoned = tasks.len(),
                "Forwarder shutdown grace period elapsed, abandoning in-flight forwards"
            );
            tasks.abort_all();
        }
    }
}

/// Forward one message, retrying transient failures with exponential backoff.
/// Exhaustion is logged, not returned.
async fn forward_with_retry(remote: &RemoteClient, message: &Message, max_attempts: usize) {
    let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
        .max_delay(RETRY_MAX_DELAY)
        .take(max_attempts.saturating_sub(1))
        .map(jitter);

    let result = Retry::spawn(retry_strategy, || async {
        match remote.forward_message(message).await {
            Ok(()) => Ok(Ok(())),
            Err(e) if e.is_transient() => {
                tracing::debug!(
                    ticket_id = %message.ticket_id,
                    message_id = %message.id,
                    error = %e,
                    "Transient forward error - will retry"
                );
                Err(e)
            }
            // Permanent errors stop the retry loop immediately
            Err(e) => Ok(Err(e)),
        }
    })
    .await
    .unwrap_or_else(Err);

    match result {
        Ok(()) => {
            tracing::info!(
                ticket_id = %message.ticket_id,
                message_id = %message.id,
                "Message forwarded to counterpart service"
            );
        }
        Err(e) => {
            tracing::error!(
                ticket_id = %message.ticket_id,
                message_id = %message.id,
                max_attempts,
                error = %e,
                "Giving up forwarding message"
            );
        }
    }
}
