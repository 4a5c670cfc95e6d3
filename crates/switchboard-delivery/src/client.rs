//! HTTP client for webhook fan-out.
//!
//! A single pooled client is shared across every endpoint task. The
//! per-request timeout is the fan-out's delivery deadline: endpoint calls
//! run concurrently, so one message's dispatch is bounded by a single
//! timeout window regardless of endpoint count.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::debug;

use switchboard_core::FORWARD_TIMEOUT;

use crate::error::EndpointError;

/// Configuration for the forward client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request deadline.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: FORWARD_TIMEOUT,
            user_agent: "Switchboard-Forwarder/0.3".to_string(),
        }
    }
}

/// Error building the underlying HTTP client.
#[derive(Debug, Error)]
#[error("failed to build forward client: {0}")]
pub struct BuildError(#[from] reqwest::Error);

/// Shared HTTP client for posting events to webhook endpoints.
#[derive(Debug, Clone)]
pub struct ForwardClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ForwardClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the HTTP client cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self, BuildError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// Creates a client with the default 3 s deadline.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when the HTTP client cannot be constructed.
    pub fn with_defaults() -> Result<Self, BuildError> {
        Self::new(ClientConfig::default())
    }

    /// Posts one event to a single endpoint.
    ///
    /// Sends the payload as JSON with the `X-Call-ID` and `X-Domain`
    /// metadata headers. Success means a response status in `[200, 300)`
    /// within the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError`] categorized as timeout, transport failure,
    /// or non-2xx status; the message always names the endpoint.
    pub async fn post_event(
        &self,
        url: &str,
        body: Bytes,
        call_id: &str,
        domain: &str,
    ) -> Result<(), EndpointError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Call-ID", call_id)
            .header("X-Domain", domain)
            .body(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    EndpointError::Timeout {
                        url: url.to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    EndpointError::Transport {
                        url: url.to_string(),
                        message: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        debug!(endpoint = url, status = status.as_u16(), "endpoint responded");

        if status.is_success() {
            Ok(())
        } else {
            Err(EndpointError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn body() -> Bytes {
        Bytes::from_static(br#"{"call_id":"c1","domain":"t.example"}"#)
    }

    #[tokio::test]
    async fn successful_post_carries_metadata_headers() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .and(matchers::header("content-type", "application/json"))
            .and(matchers::header("X-Call-ID", "c1"))
            .and(matchers::header("X-Domain", "t.example"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = ForwardClient::with_defaults().expect("client should build");
        let result = client
            .post_event(&format!("{}/hook", server.uri()), body(), "c1", "t.example")
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn non_2xx_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ForwardClient::with_defaults().expect("client should build");
        let err = client
            .post_event(&format!("{}/hook", server.uri()), body(), "c1", "t.example")
            .await
            .expect_err("500 should fail");

        assert!(matches!(err, EndpointError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn redirect_status_is_not_success() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = ForwardClient::with_defaults().expect("client should build");
        let err = client
            .post_event(&format!("{}/hook", server.uri()), body(), "c1", "t.example")
            .await
            .expect_err("304 should fail");

        assert!(matches!(err, EndpointError::Status { status: 304, .. }));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = ForwardClient::new(ClientConfig {
            timeout: Duration::from_millis(100),
            ..Default::default()
        })
        .expect("client should build");

        let err = client
            .post_event(&format!("{}/hook", server.uri()), body(), "c1", "t.example")
            .await
            .expect_err("slow endpoint should time out");

        assert!(matches!(err, EndpointError::Timeout { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let client = ForwardClient::with_defaults().expect("client should build");
        let err = client
            .post_event("http://127.0.0.1:1/hook", body(), "c1", "t.example")
            .await
            .expect_err("connection refused should fail");

        assert!(matches!(err, EndpointError::Transport { .. }));
        assert!(err.to_string().contains("http://127.0.0.1:1/hook"));
    }
}
