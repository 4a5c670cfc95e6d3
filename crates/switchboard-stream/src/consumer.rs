//! Durable explicit-ack consumer for the delivery pipeline.
//!
//! The consumer binds to a durable pull subscription whose `messages()`
//! stream behaves like a push channel: a message is yielded as soon as the
//! server delivers it, with bounded client-side buffering. Redelivery is
//! entirely the stream's job — an unacknowledged message comes back after
//! `ack_wait`, up to `max_deliver` attempts.

use std::time::Duration;

use async_nats::{
    jetstream::{
        self,
        consumer::{pull, AckPolicy, DeliverPolicy, PullConsumer},
        AckKind,
    },
    ConnectOptions, Event,
};
use tracing::{info, warn};

use crate::error::{Result, StreamError};

/// Durable name of the delivery pipeline's subscription.
pub const DURABLE_NAME: &str = "switchboard-consumer";

/// Settings for binding the durable consumer.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Stream to consume from.
    pub stream_name: String,
    /// Durable subscription name.
    pub durable_name: String,
    /// Redelivery window for unacknowledged messages.
    pub ack_wait: Duration,
    /// Bounded delivery attempts per message, including the first.
    pub max_deliveries: u32,
}

/// The durable consumer feeding the delivery pipeline.
pub struct EventConsumer {
    consumer: PullConsumer,
    durable_name: String,
}

impl EventConsumer {
    /// Connects to the transport and binds the durable consumer.
    ///
    /// The subscription is created with `deliver_policy = new` so a fresh
    /// durable never replays events published before it existed. When a
    /// durable of the same name already exists with diverging redelivery
    /// settings it is deleted and recreated; running with a mismatched
    /// `ack_wait` could shrink the redelivery window below the dispatch
    /// budget.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Connect`] when the transport is unreachable,
    /// [`StreamError::Stream`] when the stream does not exist, and
    /// [`StreamError::Consumer`] when binding fails.
    pub async fn connect(url: &str, settings: ConsumerSettings) -> Result<Self> {
        let client = ConnectOptions::new()
            .name("switchboard-consumer")
            .reconnect_delay_callback(|_attempts| Duration::from_secs(2))
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

        let context = jetstream::new(client);

        let stream = context
            .get_stream(&settings.stream_name)
            .await
            .map_err(|err| StreamError::Stream {
                stream: settings.stream_name.clone(),
                message: err.to_string(),
            })?;

        let desired = pull::Config {
            durable_name: Some(settings.durable_name.clone()),
            deliver_policy: DeliverPolicy::New,
            ack_policy: AckPolicy::Explicit,
            ack_wait: settings.ack_wait,
            max_deliver: i64::from(settings.max_deliveries),
            ..Default::default()
        };

        if let Ok(existing) = stream
            .get_consumer::<pull::Config>(&settings.durable_name)
            .await
        {
            if diverges(&existing.cached_info().config, &desired) {
                warn!(
                    consumer = %settings.durable_name,
                    "existing durable consumer has diverging settings, recreating"
                );
                stream
                    .delete_consumer(&settings.durable_name)
                    .await
                    .map_err(|err| StreamError::Consumer {
                        name: settings.durable_name.clone(),
                        message: err.to_string(),
                    })?;
            } else {
                info!(consumer = %settings.durable_name, "reusing existing durable consumer");
            }
        }

        let consumer = stream
            .create_consumer(desired)
            .await
            .map_err(|err| StreamError::Consumer {
                name: settings.durable_name.clone(),
                message: err.to_string(),
            })?;

        info!(
            stream = %settings.stream_name,
            consumer = %settings.durable_name,
            ack_wait_secs = settings.ack_wait.as_secs(),
            max_deliveries = settings.max_deliveries,
            "durable consumer bound"
        );

        Ok(Self {
            consumer,
            durable_name: settings.durable_name,
        })
    }

    /// Opens the message stream.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Messages`] when the subscription cannot be
    /// established.
    pub async fn messages(&self) -> Result<pull::Stream> {
        self.consumer
            .messages()
            .await
            .map_err(|err| StreamError::Messages(err.to_string()))
    }

    /// Durable name this consumer is bound to.
    pub fn durable_name(&self) -> &str {
        &self.durable_name
    }
}

/// Per-message stream metadata.
#[derive(Debug, Clone, Copy)]
pub struct MessageMeta {
    /// 1-based count of deliveries of this message, including this one.
    pub delivery_attempt: u64,
    /// Stream sequence number.
    pub stream_sequence: u64,
    /// Messages still pending for this consumer.
    pub pending: u64,
}

/// Extracts stream metadata from a delivered message.
///
/// Falls back to a first-attempt reading when the reply metadata cannot be
/// parsed, matching the stream's 1-based attempt counter.
pub fn metadata(message: &jetstream::Message) -> MessageMeta {
    match message.info() {
        Ok(info) => MessageMeta {
            delivery_attempt: u64::try_from(info.delivered).unwrap_or(1).max(1),
            stream_sequence: info.stream_sequence,
            pending: info.pending,
        },
        Err(_) => MessageMeta {
            delivery_attempt: 1,
            stream_sequence: 0,
            pending: 0,
        },
    }
}

/// Acknowledges a message after a fully successful fan-out.
///
/// # Errors
///
/// Returns [`StreamError::Ack`] when the acknowledgment cannot be sent.
pub async fn ack(message: &jetstream::Message) -> Result<()> {
    message
        .ack()
        .await
        .map_err(|err| StreamError::Ack(err.to_string()))
}

/// Negatively acknowledges a message, requesting immediate redelivery.
///
/// # Errors
///
/// Returns [`StreamError::Ack`] when the negative acknowledgment cannot be
/// sent.
pub async fn nak(message: &jetstream::Message) -> Result<()> {
    message
        .ack_with(AckKind::Nak(None))
        .await
        .map_err(|err| StreamError::Ack(err.to_string()))
}

// A durable is only reusable when the settings that govern redelivery all
// match what the configuration asks for.
fn diverges(existing: &jetstream::consumer::Config, desired: &pull::Config) -> bool {
    existing.ack_wait != desired.ack_wait
        || existing.max_deliver != desired.max_deliver
        || existing.ack_policy != desired.ack_policy
        || existing.deliver_policy != desired.deliver_policy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> pull::Config {
        pull::Config {
            durable_name: Some(DURABLE_NAME.to_string()),
            deliver_policy: DeliverPolicy::New,
            ack_policy: AckPolicy::Explicit,
            ack_wait: Duration::from_secs(10),
            max_deliver: 3,
            ..Default::default()
        }
    }

    fn existing() -> jetstream::consumer::Config {
        jetstream::consumer::Config {
            durable_name: Some(DURABLE_NAME.to_string()),
            deliver_policy: DeliverPolicy::New,
            ack_policy: AckPolicy::Explicit,
            ack_wait: Duration::from_secs(10),
            max_deliver: 3,
            ..Default::default()
        }
    }

    #[test]
    fn matching_durable_is_reused() {
        assert!(!diverges(&existing(), &desired()));
    }

    #[test]
    fn changed_ack_wait_forces_recreation() {
        let mut config = existing();
        config.ack_wait = Duration::from_secs(30);
        assert!(diverges(&config, &desired()));
    }

    #[test]
    fn changed_max_deliver_forces_recreation() {
        let mut config = existing();
        config.max_deliver = 5;
        assert!(diverges(&config, &desired()));
    }

    #[test]
    fn changed_policies_force_recreation() {
        let mut config = existing();
        config.deliver_policy = DeliverPolicy::All;
        assert!(diverges(&config, &desired()));

        let mut config = existing();
        config.ack_policy = AckPolicy::None;
        assert!(diverges(&config, &desired()));
    }
}
