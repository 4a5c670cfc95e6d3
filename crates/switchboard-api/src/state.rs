//! Shared state for the HTTP surface.

use std::sync::Arc;

use switchboard_core::{ConfigReloader, OutcomeStore, RouteTable};
use switchboard_stream::EventSink;

/// State handed to every handler.
///
/// The publisher is held behind the [`EventSink`] seam so handlers can be
/// exercised without a running broker.
#[derive(Clone)]
pub struct AppState {
    /// Publisher seam: persist, connectivity, stream inspection.
    pub sink: Arc<dyn EventSink>,
    /// Recorded delivery outcomes.
    pub outcomes: Arc<OutcomeStore>,
    /// Live tenant route table.
    pub routes: Arc<RouteTable>,
    /// Manual reload path shared with the file watcher.
    pub reloader: Arc<ConfigReloader>,
}

impl AppState {
    /// Bundles the shared components.
    pub fn new(
        sink: Arc<dyn EventSink>,
        outcomes: Arc<OutcomeStore>,
        routes: Arc<RouteTable>,
        reloader: Arc<ConfigReloader>,
    ) -> Self {
        Self {
            sink,
            outcomes,
            routes,
            reloader,
        }
    }
}
