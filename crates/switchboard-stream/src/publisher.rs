//! JetStream publisher and the transient stream tail reader.
//!
//! The publisher owns its own transport connection, ensures the configured
//! stream exists, and publishes every accepted ingress event to a single
//! concrete subject derived from the configured pattern. Publishing is
//! synchronous: it returns only after JetStream has acknowledged the write.

use std::time::Duration;

use async_nats::{
    connection::State,
    jetstream::{
        self,
        consumer::{pull, AckPolicy, DeliverPolicy, PullConsumer},
        stream::{Config as JsStreamConfig, RetentionPolicy},
    },
    Client, ConnectOptions, Event,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Result, StreamError};

/// Retention window for stream messages.
const STREAM_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Delay between reconnect attempts after a transport drop.
const RECONNECT_WAIT: Duration = Duration::from_secs(2);

/// Deadline for the transient tail fetch.
const TAIL_FETCH_EXPIRY: Duration = Duration::from_secs(2);

/// The publisher seam used by the HTTP surface.
///
/// Mirrors what the ingress and observability handlers need from the
/// publisher — persist, connectivity, and stream inspection — so the HTTP
/// surface stays testable without a running broker.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Persists one event payload to the stream.
    async fn publish(&self, payload: Vec<u8>) -> Result<()>;

    /// Whether the underlying transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Tails up to `limit` recent messages from the stream.
    async fn tail(&self, limit: usize) -> Result<StreamTail>;
}

/// JetStream publisher for accepted ingress events.
pub struct Publisher {
    client: Client,
    context: jetstream::Context,
    stream_name: String,
    subject: String,
}

impl Publisher {
    /// Connects to the transport and ensures the stream exists.
    ///
    /// A missing stream is created with limits-based retention and a 24 h
    /// max-age. After the initial connect the client reconnects on its own,
    /// without bound, every [`RECONNECT_WAIT`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Connect`] when the transport is unreachable
    /// and [`StreamError::Stream`] when the stream cannot be ensured.
    pub async fn connect(url: &str, stream_name: &str, subject_pattern: &str) -> Result<Self> {
        let client = ConnectOptions::new()
            .name("switchboard-publisher")
            .reconnect_delay_callback(|_attempts| RECONNECT_WAIT)
            .event_callback(|event| async move {
                match event {
                    Event::Disconnected => warn!("NATS disconnected"),
                    Event::Connected => info!("NATS reconnected"),
                    _ => {}
                }
            })
            .connect(url)
            .await
            .map_err(|err| StreamError::Connect {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let context = jetstream::new(client.clone());

        context
            .get_or_create_stream(JsStreamConfig {
                name: stream_name.to_string(),
                subjects: vec![subject_pattern.to_string()],
                retention: RetentionPolicy::Limits,
                max_age: STREAM_MAX_AGE,
                ..Default::default()
            })
            .await
            .map_err(|err| StreamError::Stream {
                stream: stream_name.to_string(),
                message: err.to_string(),
            })?;

        let subject = publish_subject(subject_pattern);
        info!(stream = stream_name, subject = %subject, "stream ready for publishing");

        Ok(Self {
            client,
            context,
            stream_name: stream_name.to_string(),
            subject,
        })
    }
}

#[async_trait]
impl EventSink for Publisher {
    async fn publish(&self, payload: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(StreamError::TransportUnavailable(
                "NATS connection is down".to_string(),
            ));
        }

        let ack = self
            .context
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|err| StreamError::PersistRejected(err.to_string()))?;

        // The publish is durable only once the server acknowledges it.
        ack.await
            .map_err(|err| StreamError::PersistRejected(err.to_string()))?;

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.connection_state() == State::Connected
    }

    /// Uses a throwaway non-acknowledging consumer that reads from the
    /// start of the stream and is removed before this call returns.
    async fn tail(&self, limit: usize) -> Result<StreamTail> {
        let stream = self
            .context
            .get_stream(&self.stream_name)
            .await
            .map_err(|err| StreamError::Stream {
                stream: self.stream_name.clone(),
                message: err.to_string(),
            })?;

        let total_messages = stream.cached_info().state.messages;

        let consumer = stream
            .create_consumer(pull::Config {
                deliver_policy: DeliverPolicy::All,
                ack_policy: AckPolicy::None,
                ..Default::default()
            })
            .await
            .map_err(|err| StreamError::Consumer {
                name: "stream-tail".to_string(),
                message: err.to_string(),
            })?;
        let consumer_name = consumer.cached_info().name.clone();

        let messages = read_tail(&consumer, limit).await;

        // Best-effort cleanup; an ephemeral consumer also dies with the
        // connection, but the inspection endpoint should not accumulate
        // them while the process lives.
        if let Err(err) = stream.delete_consumer(&consumer_name).await {
            warn!(consumer = %consumer_name, error = %err, "failed to delete tail consumer");
        }

        Ok(StreamTail {
            stream_name: self.stream_name.clone(),
            total_messages,
            messages: messages?,
        })
    }
}

async fn read_tail(consumer: &PullConsumer, limit: usize) -> Result<Vec<TailMessage>> {
    let mut batch = consumer
        .fetch()
        .max_messages(limit)
        .expires(TAIL_FETCH_EXPIRY)
        .messages()
        .await
        .map_err(|err| StreamError::Messages(err.to_string()))?;

    let mut messages = Vec::new();
    while let Some(message) = batch.next().await {
        let message = message.map_err(|err| StreamError::Messages(err.to_string()))?;
        messages.push(TailMessage::from_message(&message));
    }

    Ok(messages)
}

/// A snapshot of recent stream contents.
#[derive(Debug, Clone, Serialize)]
pub struct StreamTail {
    /// Name of the inspected stream.
    pub stream_name: String,
    /// Total messages currently retained by the stream.
    pub total_messages: u64,
    /// The fetched messages, oldest first.
    pub messages: Vec<TailMessage>,
}

/// One message from the stream tail.
#[derive(Debug, Clone, Serialize)]
pub struct TailMessage {
    /// Stream sequence number.
    pub sequence: u64,
    /// When the message was published.
    pub timestamp: DateTime<Utc>,
    /// Concrete subject the message was published under.
    pub subject: String,
    /// Raw message payload, as JSON when it parses.
    pub data: Value,
    /// Recognized telephony fields, when the payload is an event object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_summary: Option<Value>,
}

impl TailMessage {
    fn from_message(message: &jetstream::Message) -> Self {
        let (sequence, timestamp) = match message.info() {
            Ok(info) => (
                info.stream_sequence,
                DateTime::from_timestamp(
                    info.published.unix_timestamp(),
                    info.published.nanosecond(),
                )
                .unwrap_or_default(),
            ),
            Err(_) => (0, DateTime::default()),
        };

        let data: Value = serde_json::from_slice(&message.payload).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&message.payload).into_owned())
        });

        Self {
            sequence,
            timestamp,
            subject: message.subject.to_string(),
            event_summary: event_summary(&data),
            data,
        }
    }
}

fn event_summary(data: &Value) -> Option<Value> {
    let fields = data.as_object()?;
    let mut summary = serde_json::Map::new();
    for key in ["call_id", "domain", "state", "status"] {
        summary.insert(key.to_string(), fields.get(key).cloned().unwrap_or(Value::Null));
    }
    Some(Value::Object(summary))
}

/// Derives the concrete publish subject from the configured pattern.
///
/// A trailing single- or multi-level wildcard is substituted with the fixed
/// `events` token; a pattern without one is used verbatim.
fn publish_subject(pattern: &str) -> String {
    pattern
        .strip_suffix(".*")
        .or_else(|| pattern.strip_suffix(".>"))
        .map_or_else(|| pattern.to_string(), |prefix| format!("{prefix}.events"))
}
