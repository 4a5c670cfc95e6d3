//! HTTP surface of the switchboard event broker.
//!
//! Provides the ingress endpoint PBX producers post to, plus the
//! observability API: health, recorded delivery outcomes, stream
//! inspection, and route configuration with manual reload. The dashboard
//! and log-viewer frontends are external collaborators and live elsewhere.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod handlers;
pub mod server;
pub mod state;

pub use server::{create_router, start_server};
pub use state::AppState;
