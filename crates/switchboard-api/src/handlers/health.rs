//! Health check handler.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::state::AppState;

/// Handles `GET /health`.
///
/// Healthy means the stream transport is connected; a broker that cannot
/// persist events reports 503 until connectivity returns.
pub async fn health_check(State(app): State<AppState>) -> Response {
    if app.sink.is_connected() {
        (StatusCode::OK, Json(json!({ "status": "healthy" }))).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NATS not connected").into_response()
    }
}
