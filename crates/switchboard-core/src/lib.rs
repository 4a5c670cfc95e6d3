//! Core domain types for the switchboard event broker.
//!
//! Provides the schema-less event payload model, configuration loading and
//! validation, the hot-swappable route table with its reloader, and the
//! bounded in-memory outcome store. All other crates depend on these
//! foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod event;
pub mod reload;
pub mod routes;
pub mod store;

pub use config::{Config, ConfigError, NatsConfig, Route, ServerConfig, FORWARD_TIMEOUT};
pub use event::{EventPayload, PayloadError};
pub use reload::ConfigReloader;
pub use routes::RouteTable;
pub use store::{DeliveredEvent, FailedEvent, OutcomeStore, StoreStats};
