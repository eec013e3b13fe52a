//! Media Edge - a cache-aside content delivery server
//!
//! Serves origin content, resized stickers and generated avatars out of a
//! persistent sled store.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_edge::cache::Store;
use media_edge::{create_router, spawn_reclaim_task, AppState, Config};

/// Main entry point for the media edge server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from `.env` and environment variables
/// 3. Open the store and wire the caches
/// 4. Start the background expiry reclaimer
/// 5. Serve HTTP until SIGINT/SIGTERM
/// 6. Stop the reclaimer and flush the store
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_edge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Media Edge Server");

    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            warn!(error = %err, "could not read .env file");
        }
    }
    let config = Config::from_env();
    info!(
        port = config.server_port,
        database = %config.database_path.display(),
        origin = %config.origin_url,
        content_ttl = config.content_ttl,
        reclaim_interval = config.reclaim_interval,
        "configuration loaded"
    );

    let store = Store::open(&config.database_path).with_context(|| {
        format!(
            "failed to open store at {}",
            config.database_path.display()
        )
    })?;
    let state = AppState::from_config(&store, &config).context("failed to build caches")?;

    let (stop_reclaimer, shutdown) = watch::channel(false);
    let reclaimer = spawn_reclaim_task(state.content.clone(), config.reclaim_interval(), shutdown);

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = stop_reclaimer.send(true);
    if let Err(err) = reclaimer.await {
        warn!(error = %err, "reclaimer did not stop cleanly");
    }

    let flushed = store.flush().context("failed to flush store")?;
    info!(bytes = flushed, "Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
