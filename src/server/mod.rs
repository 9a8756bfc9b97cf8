//! HTTP surface over the run controller and the scope lists.

mod handlers;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::types::ListsConfig;
use crate::core::controller::RunController;

const UPLOAD_LIMIT_BYTES: usize = 10 << 20;

pub struct AppState {
    pub controller: Arc<RunController>,
    pub lists: ListsConfig,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/run", post(handlers::run_flow))
        .route("/api/status", get(handlers::status))
        .route("/api/steps", get(handlers::steps))
        .route("/api/logs", get(handlers::logs))
        .route("/api/list", get(handlers::list_entries))
        .route("/api/url", post(handlers::append_url))
        .route("/api/upload", post(handlers::upload_list))
        .route("/", get(handlers::alive))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Serves until Ctrl-C/SIGTERM, then cancels and awaits any active run.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let controller = Arc::clone(&state.controller);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if controller.is_running() {
        tracing::warn!("Cancelling active run");
    }
    controller.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
