//! Error types for the JetStream transport.

use thiserror::Error;

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors from the JetStream publisher and consumer.
///
/// The underlying client reports errors as boxed trait objects; their
/// messages are retained here so callers can log and classify without
/// depending on client internals.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Initial connection to the transport failed.
    #[error("failed to connect to NATS at {url}: {message}")]
    Connect {
        /// Transport URL that was attempted.
        url: String,
        /// Underlying error message.
        message: String,
    },

    /// The transport is not connected.
    #[error("stream transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The stream refused to persist a published message.
    #[error("stream rejected publish: {0}")]
    PersistRejected(String),

    /// Stream lookup or creation failed.
    #[error("failed to set up stream {stream}: {message}")]
    Stream {
        /// Stream name.
        stream: String,
        /// Underlying error message.
        message: String,
    },

    /// Durable consumer binding failed.
    #[error("failed to bind consumer {name}: {message}")]
    Consumer {
        /// Durable consumer name.
        name: String,
        /// Underlying error message.
        message: String,
    },

    /// Reading from the message stream failed.
    #[error("failed to read stream messages: {0}")]
    Messages(String),

    /// Acknowledgment could not be sent.
    #[error("failed to acknowledge message: {0}")]
    Ack(String),
}
