//! HTTP server construction and lifecycle.
//!
//! Builds the axum router with request tracing and a request timeout, and
//! serves it with graceful shutdown: once the shutdown token fires the
//! listener stops accepting connections and in-flight requests drain.

use std::{net::SocketAddr, time::Duration};

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use switchboard_core::ServerConfig;

use crate::{handlers, state::AppState};

/// Creates the router with every ingress and observability route.
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    // One request budget covers both configured directions; axum has no
    // separate read/write timeouts.
    let request_timeout = Duration::from_secs(
        config
            .read_timeout_seconds
            .max(config.write_timeout_seconds),
    );

    Router::new()
        .route("/events", post(handlers::ingest_event))
        .route("/health", get(handlers::health_check))
        .route("/api/events", get(handlers::list_events))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/stream/messages", get(handlers::stream_messages))
        .route("/api/config", get(handlers::get_config))
        .route("/api/config/domains", get(handlers::get_config_domains))
        .route("/api/config/reload", post(handlers::reload_config))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the listener and serves until the shutdown token fires.
///
/// # Errors
///
/// Returns `std::io::Error` when the port cannot be bound or the server
/// fails while running.
pub async fn start_server(
    state: AppState,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = create_router(state, config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}
