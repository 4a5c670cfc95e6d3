//! Consumer loop driving the delivery pipeline.
//!
//! Reads messages from the durable subscription and dispatches each on its
//! own task so a slow fan-out never blocks the loop. The acknowledgment
//! discipline is strict: Ack only after every endpoint succeeded, Nak for
//! payloads that can never be routed, and silence otherwise so the stream
//! redelivers after `ack_wait`.

use std::{sync::Arc, time::Duration};

use async_nats::jetstream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use switchboard_core::EventPayload;
use switchboard_stream::{ack, metadata, nak, EventConsumer, StreamError};

use crate::forwarder::Forwarder;

/// Pause after a stream read error before the next attempt.
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// The long-running loop between the durable consumer and the forwarder.
pub struct ConsumerLoop {
    consumer: EventConsumer,
    forwarder: Arc<Forwarder>,
}

impl ConsumerLoop {
    /// Creates the loop over a bound consumer and the shared forwarder.
    pub fn new(consumer: EventConsumer, forwarder: Arc<Forwarder>) -> Self {
        Self {
            consumer,
            forwarder,
        }
    }

    /// Runs until cancelled or the message stream closes.
    ///
    /// Each received message is processed on its own task; cancellation
    /// stops the intake while in-flight dispatches run out their own
    /// deadlines.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] when the subscription cannot be opened.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), StreamError> {
        let mut messages = self.consumer.messages().await?;
        info!(consumer = self.consumer.durable_name(), "event consumer loop started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("consumer loop stopping, in-flight dispatches will drain");
                    return Ok(());
                }
                next = messages.next() => {
                    match next {
                        Some(Ok(message)) => {
                            let forwarder = Arc::clone(&self.forwarder);
                            tokio::spawn(process_message(message, forwarder));
                        }
                        Some(Err(err)) => {
                            error!(error = %err, "failed to read message from stream");
                            tokio::time::sleep(READ_ERROR_BACKOFF).await;
                        }
                        None => {
                            info!("message stream closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

async fn process_message(message: jetstream::Message, forwarder: Arc<Forwarder>) {
    let meta = metadata(&message);
    info!(
        sequence = meta.stream_sequence,
        delivery_attempt = meta.delivery_attempt,
        num_pending = meta.pending,
        "message received from stream"
    );

    let (domain, call_id) = match inspect_payload(&message.payload) {
        Disposition::Dispatch { domain, call_id } => (domain, call_id),
        Disposition::Reject { reason } => {
            error!(
                sequence = meta.stream_sequence,
                delivery_attempt = meta.delivery_attempt,
                reason = %reason,
                "rejecting undeliverable message"
            );
            if let Err(err) = nak(&message).await {
                error!(error = %err, "failed to NAK message");
            }
            return;
        }
    };

    info!(
        call_id = %call_id,
        domain = %domain,
        sequence = meta.stream_sequence,
        delivery_attempt = meta.delivery_attempt,
        "processing message"
    );

    // The dispatch deadline is the forward client's per-request timeout:
    // endpoint calls run concurrently, so the whole fan-out resolves within
    // one timeout window and the outcome is always recorded.
    match forwarder
        .forward(&message.payload, &domain, meta.delivery_attempt)
        .await
    {
        Ok(()) => {
            if let Err(err) = ack(&message).await {
                error!(
                    call_id = %call_id,
                    sequence = meta.stream_sequence,
                    error = %err,
                    "failed to acknowledge message"
                );
                return;
            }
            info!(
                call_id = %call_id,
                domain = %domain,
                sequence = meta.stream_sequence,
                delivery_attempt = meta.delivery_attempt,
                "event processed and acknowledged"
            );
        }
        Err(err) => {
            // No Ack: the stream redelivers after ack_wait with an
            // incremented attempt counter, until max_deliver is reached.
            warn!(
                call_id = %call_id,
                domain = %domain,
                sequence = meta.stream_sequence,
                current_attempt = meta.delivery_attempt,
                error = %err,
                "forward failed, message will be redelivered by the stream"
            );
        }
    }
}

enum Disposition {
    Dispatch { domain: String, call_id: String },
    Reject { reason: String },
}

// A message that cannot name a tenant can never be routed; immediate NAK
// lets max_deliver discard it instead of waiting out ack_wait each round.
fn inspect_payload(payload: &[u8]) -> Disposition {
    match EventPayload::parse(payload) {
        Ok(event) => match event.domain() {
            Some(domain) => Disposition::Dispatch {
                domain: domain.to_string(),
                call_id: event.call_id().unwrap_or_default(),
            },
            None => Disposition::Reject {
                reason: "event missing domain field".to_string(),
            },
        },
        Err(err) => Disposition::Reject {
            reason: format!("failed to parse event: {err}"),
        },
    }
}
