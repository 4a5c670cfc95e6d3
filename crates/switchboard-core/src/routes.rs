//! Hot-swappable tenant route table.
//!
//! The table is an immutable snapshot behind a lock: readers capture the
//! current snapshot once per lookup, and a reload replaces the whole map in
//! one step. A lookup therefore observes either the old table or the new
//! one, never a partial update.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use crate::config::Route;

type RouteMap = HashMap<String, Vec<String>>;

/// Thread-safe domain → endpoints table.
#[derive(Debug)]
pub struct RouteTable {
    routes: RwLock<Arc<RouteMap>>,
}

impl RouteTable {
    /// Builds a table from configured routes.
    pub fn new(routes: &[Route]) -> Self {
        Self {
            routes: RwLock::new(Arc::new(build_map(routes))),
        }
    }

    /// Returns the endpoints for a domain from the current snapshot.
    pub fn endpoints_for(&self, domain: &str) -> Option<Vec<String>> {
        self.snapshot().get(domain).cloned()
    }

    /// Replaces the whole table with new routes.
    ///
    /// Lookups already holding the previous snapshot are unaffected.
    pub fn replace(&self, routes: &[Route]) {
        let next = Arc::new(build_map(routes));
        *self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Captures the current snapshot.
    pub fn snapshot(&self) -> Arc<RouteMap> {
        Arc::clone(&self.routes.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Returns the configured domains, sorted.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.snapshot().keys().cloned().collect();
        domains.sort();
        domains
    }

    /// Number of configured routes.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether no routes are configured.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

// First route wins on duplicate domains, matching Config::endpoints_for.
fn build_map(routes: &[Route]) -> RouteMap {
    let mut map = RouteMap::with_capacity(routes.len());
    for route in routes {
        map.entry(route.domain.clone())
            .or_insert_with(|| route.endpoints.clone());
    }
    map
}
