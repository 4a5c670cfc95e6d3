//! Delivery outcome handlers.
//!
//! Serve the bounded in-memory outcome store: recorded fan-outs grouped by
//! tenant, newest first, plus the aggregate counters the dashboard polls.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use switchboard_core::{DeliveredEvent, FailedEvent, StoreStats};

use crate::state::AppState;

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Restrict to one tenant.
    pub domain: Option<String>,
    /// `successful`, `failed`, or `all` (default).
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Handles `GET /api/events`.
pub async fn list_events(
    State(app): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Value> {
    let kind = query.kind.as_deref().unwrap_or("all");

    let mut delivered: HashMap<String, Vec<DeliveredEvent>> = HashMap::new();
    let mut failed: HashMap<String, Vec<FailedEvent>> = HashMap::new();

    match &query.domain {
        Some(domain) => {
            if kind != "failed" {
                delivered.insert(domain.clone(), app.outcomes.delivered_for(domain));
            }
            if kind != "successful" {
                failed.insert(domain.clone(), app.outcomes.failed_for(domain));
            }
        }
        None => {
            if kind != "failed" {
                delivered = app.outcomes.delivered_by_domain();
            }
            if kind != "successful" {
                failed = app.outcomes.failed_by_domain();
            }
        }
    }

    Json(json!({
        "events_by_domain": delivered,
        "failed_events_by_domain": failed,
        "stats": app.outcomes.stats(),
    }))
}

/// Handles `GET /api/stats`.
pub async fn get_stats(State(app): State<AppState>) -> Json<StoreStats> {
    Json(app.outcomes.stats())
}
