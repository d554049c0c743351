//! DeskRelay server binary
//!
//! One binary serves either side of the pair; `SERVICE_ORIGIN` decides whether
//! this deployment is the widget intake service or the agent backend.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use deskrelay_api::routes::create_router;
use deskrelay_api::sync::SyncWorker;
use deskrelay_api::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let bind_address = config.bind_address.clone();
    let service_origin = config.service_origin;

    let state = AppState::new(config).context("Failed to build application state")?;

    // Background sync against the counterpart service
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_worker = SyncWorker::new(
        Arc::clone(&state.store),
        Arc::clone(&state.hub),
        Arc::clone(&state.remote),
        state.config.sync_interval(),
        state.config.freshness_window(),
    );
    let sync_handle = tokio::spawn(sync_worker.run(shutdown_rx));

    let hub = Arc::clone(&state.hub);
    let forwarder = Arc::clone(&state.forwarder);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    tracing::info!(
        bind_address = %bind_address,
        service_origin = %service_origin,
        "DeskRelay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Ordered teardown: stop the sync loop, close live sockets, then give
    // in-flight forwards a bounded window to finish
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    let _ = sync_handle.await;
    hub.close_all().await;
    forwarder.shutdown(Duration::from_secs(5)).await;

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
