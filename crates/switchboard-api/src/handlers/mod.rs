//! Request handlers for the HTTP surface.

pub mod config;
pub mod events;
pub mod health;
pub mod ingest;
pub mod stream;

pub use config::{get_config, get_config_domains, reload_config};
pub use events::{get_stats, list_events};
pub use health::health_check;
pub use ingest::ingest_event;
pub use stream::stream_messages;
