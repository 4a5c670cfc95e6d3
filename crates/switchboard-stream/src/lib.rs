//! JetStream transport for the switchboard event broker.
//!
//! Wraps the NATS JetStream client behind the broker's two roles: the
//! publisher that persists accepted ingress events, and the durable
//! explicit-ack consumer that feeds the delivery pipeline. Also provides
//! the transient tail reader behind the stream inspection endpoint.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consumer;
pub mod error;
pub mod publisher;

pub use consumer::{ack, metadata, nak, ConsumerSettings, EventConsumer, MessageMeta, DURABLE_NAME};
pub use error::StreamError;
pub use publisher::{EventSink, Publisher, StreamTail, TailMessage};
