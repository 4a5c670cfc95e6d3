//! Stream inspection handler.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::state::AppState;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Query parameters for `GET /api/stream/messages`.
#[derive(Debug, Deserialize)]
pub struct TailQuery {
    /// Maximum messages to fetch, clamped to `1..=1000`.
    pub limit: Option<usize>,
}

/// Handles `GET /api/stream/messages`.
///
/// Reads up to `limit` recent messages through a transient non-ack
/// consumer that is removed before the response is written.
pub async fn stream_messages(
    State(app): State<AppState>,
    Query(query): Query<TailQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    match app.sink.tail(limit).await {
        Ok(tail) => Json(json!({
            "stream_name": tail.stream_name,
            "total_messages": tail.total_messages,
            "count": tail.messages.len(),
            "messages": tail.messages,
        }))
        .into_response(),
        Err(err) => {
            error!(error = %err, "failed to read stream messages");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read stream messages: {err}"),
            )
                .into_response()
        }
    }
}
