//! Schema-less telephony event payloads.
//!
//! PBX dialects disagree on field sets and naming, so events are modeled as
//! a dynamic JSON object rather than a typed struct. Every field the
//! producer sent is carried through to delivery untouched; the broker only
//! recognizes the tenant attribute (`domain`/`Domain`) and, when present,
//! the call identifier (`call_id`/`CallID`).

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from parsing an event payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The body is not valid JSON.
    #[error("invalid JSON payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The body is valid JSON but not an object.
    #[error("event payload is not a JSON object")]
    NotAnObject,
}

/// A telephony signaling event with its full producer-supplied field set.
///
/// Wraps a JSON object and round-trips unknown fields verbatim. Mutation is
/// limited to normalization of the recognized attributes and the delivery
/// metadata added before fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    fields: Map<String, Value>,
}

impl EventPayload {
    /// Parses raw bytes into an event payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Malformed`] for invalid JSON and
    /// [`PayloadError::NotAnObject`] for JSON that is not an object.
    pub fn parse(bytes: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(bytes)?;
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(PayloadError::NotAnObject),
        }
    }

    /// Returns the tenant identifier, checking `domain` then `Domain`.
    ///
    /// Empty strings are treated as absent.
    pub fn domain(&self) -> Option<&str> {
        for key in ["domain", "Domain"] {
            if let Some(domain) = self.fields.get(key).and_then(Value::as_str) {
                if !domain.is_empty() {
                    return Some(domain);
                }
            }
        }
        None
    }

    /// Ensures the tenant identifier is present under the lower-case key.
    ///
    /// When only `Domain` is set, a `domain` key with the same value is
    /// inserted; the capitalized key is left in place. Returns the tenant,
    /// or `None` when neither form carries a non-empty string.
    pub fn normalize_domain(&mut self) -> Option<String> {
        let domain = self.domain()?.to_string();
        self.fields
            .entry("domain")
            .or_insert_with(|| Value::String(domain.clone()));
        Some(domain)
    }

    /// Returns the call identifier, checking `call_id` then `CallID`.
    ///
    /// Producers send the identifier as either a string or a number;
    /// numbers are rendered as their integer text.
    pub fn call_id(&self) -> Option<String> {
        for key in ["call_id", "CallID"] {
            match self.fields.get(key) {
                Some(Value::String(id)) if !id.is_empty() => return Some(id.clone()),
                Some(Value::Number(id)) => return Some(render_numeric_id(id)),
                _ => {}
            }
        }
        None
    }

    /// Normalizes the call identifier to a `call_id` string key.
    ///
    /// Returns the identifier, or `None` when the event carries none.
    pub fn normalize_call_id(&mut self) -> Option<String> {
        let call_id = self.call_id()?;
        self.fields
            .insert("call_id".to_string(), Value::String(call_id.clone()));
        Some(call_id)
    }

    /// Returns the `state` field when present, for logging.
    pub fn state(&self) -> Option<&str> {
        self.fields.get("state").and_then(Value::as_str)
    }

    /// Returns the `status` field when present, for logging.
    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    /// Stamps the delivery metadata added before fan-out.
    ///
    /// Sets `delivery_attempt` to the stream's 1-based attempt counter and
    /// marks the payload with `using_forwarder = 1`.
    pub fn enrich(&mut self, attempt: u64) {
        self.fields
            .insert("delivery_attempt".to_string(), Value::from(attempt));
        self.fields
            .insert("using_forwarder".to_string(), Value::from(1));
    }

    /// Serializes the payload back to bytes.
    ///
    /// # Errors
    ///
    /// Returns a serialization error from `serde_json`.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.fields)
    }

    /// Returns the full field set as a JSON value, for structured logs and
    /// outcome records.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Returns a reference to the underlying fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

fn render_numeric_id(id: &serde_json::Number) -> String {
    if let Some(int) = id.as_i64() {
        int.to_string()
    } else if let Some(int) = id.as_u64() {
        int.to_string()
    } else {
        // Some PBXs emit large identifiers as floats; keep the integer part.
        format!("{:.0}", id.as_f64().unwrap_or(0.0))
    }
}
