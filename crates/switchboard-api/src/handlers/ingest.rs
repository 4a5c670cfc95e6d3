//! Event ingress handler.
//!
//! Accepts arbitrary JSON telephony events from PBX producers, validates
//! the tenant attribute, normalizes recognized field variants, and persists
//! the event to the stream. Delivery failures are never visible here: the
//! producer only learns whether the event was accepted.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::{error, info, warn};

use switchboard_core::EventPayload;

use crate::state::AppState;

/// Handles `POST /events`.
///
/// Responds 400 with `Invalid JSON payload` when the body is not a JSON
/// object, 400 with `domain is required` when no tenant attribute is
/// present, 500 when the stream rejects the publish, and 200 with
/// `{"status":"accepted"}` on success.
pub async fn ingest_event(State(app): State<AppState>, body: Bytes) -> Response {
    let mut event = match EventPayload::parse(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "failed to decode event");
            return (StatusCode::BAD_REQUEST, "Invalid JSON payload").into_response();
        }
    };

    let Some(domain) = event.normalize_domain() else {
        return (StatusCode::BAD_REQUEST, "domain is required").into_response();
    };
    let call_id = event.normalize_call_id().unwrap_or_default();

    let payload = match event.to_bytes() {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, call_id = %call_id, domain = %domain, "failed to serialize event");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    if let Err(err) = app.sink.publish(payload).await {
        error!(error = %err, call_id = %call_id, domain = %domain, "failed to publish event");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
    }

    // Logged before any forwarding happens: one entry here per event the
    // PBX actually sent. Duplicate call_ids at this line mean the producer
    // re-sent the event, not that the broker duplicated it.
    info!(
        call_id = %call_id,
        domain = %domain,
        state = event.state().unwrap_or_default(),
        status = event.status().unwrap_or_default(),
        event = %event.to_value(),
        "Event received and published"
    );

    (StatusCode::OK, Json(json!({ "status": "accepted" }))).into_response()
}
