//! All-or-nothing concurrent fan-out to a tenant's endpoints.
//!
//! Forwards each delivered message to every endpoint configured for its
//! tenant in parallel and reports success only when all of them acknowledge.
//! Any endpoint failure fails the whole fan-out, the message stays
//! unacknowledged, and the stream redelivers it in full; endpoints that
//! already succeeded will see the event again. Backends must therefore be
//! idempotent on the event's call identifier.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use switchboard_core::{EventPayload, OutcomeStore, RouteTable};

use crate::{client::ForwardClient, error::ForwardError};

/// Concurrent webhook fan-out with outcome recording.
pub struct Forwarder {
    routes: Arc<RouteTable>,
    outcomes: Arc<OutcomeStore>,
    client: ForwardClient,
    max_deliveries: u32,
}

impl Forwarder {
    /// Creates a forwarder over the shared route table and outcome store.
    pub fn new(
        routes: Arc<RouteTable>,
        outcomes: Arc<OutcomeStore>,
        client: ForwardClient,
        max_deliveries: u32,
    ) -> Self {
        Self {
            routes,
            outcomes,
            client,
            max_deliveries,
        }
    }

    /// Forwards one delivered message to every endpoint of its tenant.
    ///
    /// The payload is enriched with `delivery_attempt` and
    /// `using_forwarder = 1`; when it cannot be parsed or re-serialized the
    /// untouched payload is sent instead. All endpoints are attempted even
    /// after the first failure so the recorded outcome is complete. The
    /// caller must not acknowledge the source message when this returns an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::NoRoute`] when the tenant has no endpoints
    /// (no HTTP traffic is issued) and [`ForwardError::Endpoints`] with one
    /// message per failed endpoint otherwise.
    pub async fn forward(
        &self,
        payload: &[u8],
        domain: &str,
        attempt: u64,
    ) -> Result<(), ForwardError> {
        let mut parsed = match EventPayload::parse(payload) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(domain, error = %err, "failed to parse event for forwarding");
                None
            }
        };
        let call_id = parsed
            .as_mut()
            .and_then(EventPayload::normalize_call_id)
            .unwrap_or_default();
        let event_value = parsed
            .as_ref()
            .map_or_else(|| json!({ "call_id": call_id }), EventPayload::to_value);

        let endpoints = self.routes.endpoints_for(domain).unwrap_or_default();
        if endpoints.is_empty() {
            let err = ForwardError::NoRoute {
                domain: domain.to_string(),
            };
            error!(domain, call_id = %call_id, delivery_attempt = attempt, "no endpoints configured for domain");
            self.outcomes.add_failed(
                event_value,
                domain,
                &call_id,
                attempt,
                self.max_deliveries,
                Vec::new(),
                vec![err.to_string()],
            );
            return Err(err);
        }

        let (body, log_event) = enrich_body(parsed, payload, attempt, &call_id);

        info!(
            domain,
            call_id = %call_id,
            delivery_attempt = attempt,
            endpoint_count = endpoints.len(),
            event = %log_event,
            "forwarding event"
        );

        let mut tasks = JoinSet::new();
        for endpoint in endpoints.iter().cloned() {
            let client = self.client.clone();
            let body = body.clone();
            let call_id = call_id.clone();
            let domain = domain.to_string();
            tasks.spawn(async move { client.post_event(&endpoint, body, &call_id, &domain).await });
        }

        // Every endpoint is awaited; failures are collected, not raced.
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(err.to_string()),
                Err(err) => errors.push(format!("fan-out task failed: {err}")),
            }
        }

        if errors.is_empty() {
            info!(
                domain,
                call_id = %call_id,
                endpoint_count = endpoints.len(),
                event = %log_event,
                "Event forwarded successfully"
            );
            self.outcomes
                .add_delivered(event_value, domain, &call_id, attempt, endpoints);
            return Ok(());
        }

        error!(
            domain,
            call_id = %call_id,
            failed_endpoints = errors.len(),
            errors = ?errors,
            event = %log_event,
            "Failed to forward event"
        );
        self.outcomes.add_failed(
            event_value,
            domain,
            &call_id,
            attempt,
            self.max_deliveries,
            endpoints,
            errors.clone(),
        );

        Err(ForwardError::Endpoints {
            failed: errors.len(),
            errors,
        })
    }
}

// Enrichment must never lose an event: a payload that does not parse or
// re-serialize is forwarded untouched.
fn enrich_body(
    parsed: Option<EventPayload>,
    payload: &[u8],
    attempt: u64,
    call_id: &str,
) -> (Bytes, Value) {
    match parsed {
        Some(mut event) => {
            event.enrich(attempt);
            let log_event = event.to_value();
            match event.to_bytes() {
                Ok(bytes) => (Bytes::from(bytes), log_event),
                Err(err) => {
                    warn!(call_id, error = %err, "failed to enrich payload, using original payload");
                    (Bytes::copy_from_slice(payload), log_event)
                }
            }
        }
        None => (
            Bytes::copy_from_slice(payload),
            json!({ "call_id": call_id }),
        ),
    }
}
