//! Route configuration handlers.
//!
//! Expose the live route table and the manual reload path. Reload shares
//! the reloader with the file watcher: both swap the table only when the
//! file validates, so a bad edit can never black-hole traffic.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use switchboard_core::ConfigError;

use crate::state::AppState;

/// Handles `GET /api/config`.
///
/// Returns the current route snapshot, sorted by domain.
pub async fn get_config(State(app): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = app.routes.snapshot();
    let mut routes: Vec<serde_json::Value> = snapshot
        .iter()
        .map(|(domain, endpoints)| json!({ "domain": domain, "endpoints": endpoints }))
        .collect();
    routes.sort_by(|a, b| a["domain"].as_str().cmp(&b["domain"].as_str()));

    Json(json!({
        "routes": routes,
        "count": routes.len(),
    }))
}

/// Handles `GET /api/config/domains`.
pub async fn get_config_domains(State(app): State<AppState>) -> Json<serde_json::Value> {
    let domains = app.routes.domains();
    Json(json!({
        "count": domains.len(),
        "domains": domains,
    }))
}

/// Handles `POST /api/config/reload`.
///
/// Responds 400 when the file on disk fails to parse or validate (the live
/// table is untouched), 500 when the file cannot be read, and 200 with the
/// new route count otherwise.
pub async fn reload_config(State(app): State<AppState>) -> Response {
    match app.reloader.reload() {
        Ok(route_count) => Json(json!({
            "status": "success",
            "message": "Configuration reloaded successfully",
            "routes": route_count,
        }))
        .into_response(),
        Err(err @ (ConfigError::Parse { .. } | ConfigError::Invalid(_))) => {
            error!(error = %err, "rejected invalid config reload");
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to reload config: {err}"),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err, "failed to reload config");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to reload config: {err}"),
            )
                .into_response()
        }
    }
}
