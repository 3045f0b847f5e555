use std::net::SocketAddr;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{get_work, health, invoke, latest_run},
    state::AppState,
};
use crate::config::Config;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// In-flight requests the server will hold at once
const MAX_IN_FLIGHT: usize = 64;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/invoke", post(invoke))
        .route("/works/{work_id}", get(get_work))
        .route("/runs/{work_id}/latest", get(latest_run))
        .route("/health", get(health))
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT))
}

pub async fn run(config: Config) -> Result<(), AnyError> {
    let address: SocketAddr = config.server.bind_addr;
    let state = AppState::from_config(config)?;
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "MangaBox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // in-flight runs stop issuing fetches and report as aborted
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
