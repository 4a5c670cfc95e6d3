//! Error types for webhook fan-out.

use thiserror::Error;

/// A single endpoint's delivery failure.
///
/// Messages retain the endpoint URL so the aggregated error list stays
/// actionable in logs and the outcome store.
#[derive(Debug, Clone, Error)]
pub enum EndpointError {
    /// The endpoint did not respond within the per-request deadline.
    #[error("endpoint {url} failed: request timed out after {timeout_secs}s")]
    Timeout {
        /// Target webhook URL.
        url: String,
        /// Deadline that was exceeded, in seconds.
        timeout_secs: u64,
    },

    /// The request could not be completed at the transport level.
    #[error("endpoint {url} failed: {message}")]
    Transport {
        /// Target webhook URL.
        url: String,
        /// Underlying error message.
        message: String,
    },

    /// The endpoint answered outside the 2xx range.
    #[error("endpoint {url} failed: non-2xx response: {status}")]
    Status {
        /// Target webhook URL.
        url: String,
        /// HTTP status code returned.
        status: u16,
    },
}

/// A fan-out failure for one delivered message.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The tenant has no configured route; no HTTP traffic was issued.
    #[error("no endpoints configured for domain: {domain}")]
    NoRoute {
        /// The unrouted tenant.
        domain: String,
    },

    /// One or more endpoints failed; every endpoint was still attempted.
    #[error("failed to forward to {} endpoint(s): {}", .failed, .errors.join("; "))]
    Endpoints {
        /// Number of failed endpoints.
        failed: usize,
        /// One message per failed endpoint.
        errors: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_errors_name_the_endpoint() {
        let err = EndpointError::Status {
            url: "http://a.example/hook".into(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "endpoint http://a.example/hook failed: non-2xx response: 503"
        );
    }

    #[test]
    fn aggregate_error_lists_every_failure() {
        let err = ForwardError::Endpoints {
            failed: 2,
            errors: vec!["endpoint a failed: x".into(), "endpoint b failed: y".into()],
        };
        let text = err.to_string();
        assert!(text.starts_with("failed to forward to 2 endpoint(s)"));
        assert!(text.contains("endpoint a failed: x"));
        assert!(text.contains("endpoint b failed: y"));
    }
}
