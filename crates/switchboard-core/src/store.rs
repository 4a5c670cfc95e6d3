//! Bounded in-memory store of delivery outcomes.
//!
//! Keeps the most recent successful and failed fan-outs for the live
//! observability API. Both lists are FIFO and bounded; the store is
//! process-lived and lost on restart.

use std::{
    collections::{HashMap, HashSet},
    sync::{PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Default bound for each outcome list.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Upper bound on how many of the oldest entries are dropped in one batch
/// when a list hits its bound, amortizing the shift cost of the backing
/// `Vec`.
const MAX_EVICTION_BATCH: usize = 100;

/// A successfully fanned-out event.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveredEvent {
    /// Full event object as forwarded.
    pub event: Value,
    /// Tenant the event was routed by.
    pub domain: String,
    /// Call identifier, empty when the producer sent none.
    pub call_id: String,
    /// When every endpoint had acknowledged.
    pub forwarded_at: DateTime<Utc>,
    /// 1-based stream delivery attempt that succeeded.
    pub delivery_attempt: u64,
    /// Endpoints that received the event.
    pub endpoints: Vec<String>,
}

/// A fan-out that failed on at least one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FailedEvent {
    /// Full event object as attempted.
    pub event: Value,
    /// Tenant the event was routed by.
    pub domain: String,
    /// Call identifier, empty when the producer sent none.
    pub call_id: String,
    /// When the failure was recorded.
    pub failed_at: DateTime<Utc>,
    /// 1-based stream delivery attempt that failed.
    pub delivery_attempt: u64,
    /// Configured bound on delivery attempts.
    pub max_deliveries: u32,
    /// Endpoints configured at dispatch time.
    pub endpoints: Vec<String>,
    /// One message per failed endpoint.
    pub error_messages: Vec<String>,
    /// Whether the stream will redeliver this message.
    pub will_retry: bool,
}

/// Aggregate outcome counters for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Successful fan-outs currently retained.
    pub total_successful: usize,
    /// Failed fan-outs currently retained.
    pub total_failed: usize,
    /// Sum of the two totals.
    pub total_events: usize,
    /// Failures for which a redelivery is still expected.
    pub retry_count: usize,
    /// Successful fan-outs per domain.
    pub successful_domain_count: HashMap<String, usize>,
    /// Failed fan-outs per domain.
    pub failed_domain_count: HashMap<String, usize>,
    /// Distinct domains seen across both lists.
    pub domains: usize,
}

#[derive(Debug, Default)]
struct Outcomes {
    delivered: Vec<DeliveredEvent>,
    failed: Vec<FailedEvent>,
}

/// Bounded FIFO store of delivery outcomes.
///
/// Entries are immutable after insertion; readers get defensive copies.
#[derive(Debug)]
pub struct OutcomeStore {
    outcomes: RwLock<Outcomes>,
    capacity: usize,
}

impl OutcomeStore {
    /// Creates a store bounding each list at `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            outcomes: RwLock::new(Outcomes::default()),
            capacity,
        }
    }

    /// Records a successful fan-out.
    pub fn add_delivered(
        &self,
        event: Value,
        domain: impl Into<String>,
        call_id: impl Into<String>,
        delivery_attempt: u64,
        endpoints: Vec<String>,
    ) {
        let entry = DeliveredEvent {
            event,
            domain: domain.into(),
            call_id: call_id.into(),
            forwarded_at: Utc::now(),
            delivery_attempt,
            endpoints,
        };

        let mut outcomes = self.write();
        evict_if_full(&mut outcomes.delivered, self.capacity);
        outcomes.delivered.push(entry);
    }

    /// Records a failed fan-out.
    ///
    /// `will_retry` is derived from the attempt counter: the stream keeps
    /// redelivering while `delivery_attempt < max_deliveries`.
    pub fn add_failed(
        &self,
        event: Value,
        domain: impl Into<String>,
        call_id: impl Into<String>,
        delivery_attempt: u64,
        max_deliveries: u32,
        endpoints: Vec<String>,
        error_messages: Vec<String>,
    ) {
        let entry = FailedEvent {
            event,
            domain: domain.into(),
            call_id: call_id.into(),
            failed_at: Utc::now(),
            delivery_attempt,
            max_deliveries,
            endpoints,
            error_messages,
            will_retry: delivery_attempt < u64::from(max_deliveries),
        };

        let mut outcomes = self.write();
        evict_if_full(&mut outcomes.failed, self.capacity);
        outcomes.failed.push(entry);
    }

    /// Successful fan-outs for one domain, newest first.
    pub fn delivered_for(&self, domain: &str) -> Vec<DeliveredEvent> {
        self.read()
            .delivered
            .iter()
            .rev()
            .filter(|event| event.domain == domain)
            .cloned()
            .collect()
    }

    /// Failed fan-outs for one domain, newest first.
    pub fn failed_for(&self, domain: &str) -> Vec<FailedEvent> {
        self.read()
            .failed
            .iter()
            .rev()
            .filter(|event| event.domain == domain)
            .cloned()
            .collect()
    }

    /// All successful fan-outs grouped by domain, newest first per domain.
    pub fn delivered_by_domain(&self) -> HashMap<String, Vec<DeliveredEvent>> {
        let mut grouped: HashMap<String, Vec<DeliveredEvent>> = HashMap::new();
        for event in self.read().delivered.iter().rev() {
            grouped.entry(event.domain.clone()).or_default().push(event.clone());
        }
        grouped
    }

    /// All failed fan-outs grouped by domain, newest first per domain.
    pub fn failed_by_domain(&self) -> HashMap<String, Vec<FailedEvent>> {
        let mut grouped: HashMap<String, Vec<FailedEvent>> = HashMap::new();
        for event in self.read().failed.iter().rev() {
            grouped.entry(event.domain.clone()).or_default().push(event.clone());
        }
        grouped
    }

    /// Computes aggregate counters over the retained outcomes.
    pub fn stats(&self) -> StoreStats {
        let outcomes = self.read();

        let mut successful_domain_count: HashMap<String, usize> = HashMap::new();
        for event in &outcomes.delivered {
            *successful_domain_count.entry(event.domain.clone()).or_default() += 1;
        }

        let mut failed_domain_count: HashMap<String, usize> = HashMap::new();
        for event in &outcomes.failed {
            *failed_domain_count.entry(event.domain.clone()).or_default() += 1;
        }

        let retry_count = outcomes.failed.iter().filter(|event| event.will_retry).count();

        let domains = {
            let distinct: HashSet<&String> = successful_domain_count
                .keys()
                .chain(failed_domain_count.keys())
                .collect();
            distinct.len()
        };

        StoreStats {
            total_successful: outcomes.delivered.len(),
            total_failed: outcomes.failed.len(),
            total_events: outcomes.delivered.len() + outcomes.failed.len(),
            retry_count,
            domains,
            successful_domain_count,
            failed_domain_count,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Outcomes> {
        self.outcomes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Outcomes> {
        self.outcomes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for OutcomeStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// One tenth of the capacity per batch keeps the list within its bound
// while spreading the shift cost over many inserts.
fn evict_if_full<T>(entries: &mut Vec<T>, capacity: usize) {
    if entries.len() >= capacity {
        let batch = (capacity / 10).clamp(1, MAX_EVICTION_BATCH).min(entries.len());
        entries.drain(..batch);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn add_delivered(store: &OutcomeStore, domain: &str, call_id: &str) {
        store.add_delivered(
            json!({"call_id": call_id, "domain": domain}),
            domain,
            call_id,
            1,
            vec!["http://a.example/hook".to_string()],
        );
    }

    #[test]
    fn delivered_events_grouped_newest_first() {
        let store = OutcomeStore::default();
        add_delivered(&store, "t.example", "c1");
        add_delivered(&store, "t.example", "c2");
        add_delivered(&store, "u.example", "c3");

        let grouped = store.delivered_by_domain();
        let t_events = &grouped["t.example"];
        assert_eq!(t_events.len(), 2);
        assert_eq!(t_events[0].call_id, "c2");
        assert_eq!(t_events[1].call_id, "c1");
        assert_eq!(grouped["u.example"].len(), 1);

        let filtered = store.delivered_for("t.example");
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].call_id, "c2");
    }

    #[test]
    fn will_retry_tracks_attempt_versus_max_deliveries() {
        let store = OutcomeStore::default();
        for attempt in 1..=3 {
            store.add_failed(
                json!({"call_id": "c1", "domain": "t.example"}),
                "t.example",
                "c1",
                attempt,
                3,
                vec!["http://a.example/hook".to_string()],
                vec!["endpoint http://a.example/hook failed: non-2xx response: 500".to_string()],
            );
        }

        let failed = store.failed_for("t.example");
        assert_eq!(failed.len(), 3);
        // Newest first: attempt 3 is the final one and will not retry.
        assert!(!failed[0].will_retry);
        assert!(failed[1].will_retry);
        assert!(failed[2].will_retry);

        let stats = store.stats();
        assert_eq!(stats.total_failed, 3);
        assert_eq!(stats.retry_count, 2);
    }

    #[test]
    fn oldest_entries_evicted_in_batches() {
        let store = OutcomeStore::new(10);
        for i in 0..10 {
            add_delivered(&store, "t.example", &format!("c{i}"));
        }

        // The list is at capacity; the next insert drops the oldest batch.
        add_delivered(&store, "t.example", "c10");

        let events = store.delivered_for("t.example");
        assert!(events.len() <= 10);
        assert_eq!(events[0].call_id, "c10");
        assert!(!events.iter().any(|event| event.call_id == "c0"));
    }

    #[test]
    fn store_never_exceeds_capacity() {
        let store = OutcomeStore::new(50);
        for i in 0..500 {
            add_delivered(&store, "t.example", &format!("c{i}"));
        }
        assert!(store.stats().total_successful <= 50);
    }

    #[test]
    fn stats_count_distinct_domains_once() {
        let store = OutcomeStore::default();
        add_delivered(&store, "t.example", "c1");
        store.add_failed(
            json!({"domain": "t.example"}),
            "t.example",
            "c2",
            1,
            3,
            vec![],
            vec!["no endpoints configured for domain: t.example".to_string()],
        );
        add_delivered(&store, "u.example", "c3");

        let stats = store.stats();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.domains, 2);
        assert_eq!(stats.successful_domain_count["t.example"], 1);
        assert_eq!(stats.failed_domain_count["t.example"], 1);
    }

    #[test]
    fn reads_are_defensive_copies() {
        let store = OutcomeStore::default();
        add_delivered(&store, "t.example", "c1");

        let mut copy = store.delivered_for("t.example");
        copy.clear();

        assert_eq!(store.delivered_for("t.example").len(), 1);
    }
}
