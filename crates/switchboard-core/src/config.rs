//! Configuration loading and validation.
//!
//! The broker is configured by a single operator-managed YAML file with
//! three sections: the HTTP server, the JetStream connection, and the
//! tenant routing table. Only the routing table is hot-reloadable; server
//! and stream settings require a restart.

use std::{collections::HashMap, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-endpoint HTTP timeout for webhook fan-out.
///
/// The stream's `ack_wait` must strictly exceed this so a slow endpoint
/// cannot trigger a redelivery while the prior attempt is still in flight.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid YAML for the expected shape.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that was attempted.
        path: String,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// The configuration parsed but fails a validation rule.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete broker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// JetStream connection and redelivery settings.
    pub nats: NatsConfig,
    /// Tenant routing table.
    #[serde(default)]
    pub routes: Vec<Route>,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,
    /// Read timeout in seconds.
    #[serde(default = "default_server_timeout")]
    pub read_timeout_seconds: u64,
    /// Write timeout in seconds.
    #[serde(default = "default_server_timeout")]
    pub write_timeout_seconds: u64,
}

/// JetStream settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NatsConfig {
    /// Transport URL, e.g. `nats://localhost:4222`.
    pub url: String,
    /// Durable stream name.
    pub stream_name: String,
    /// Publish/subscribe subject pattern; a trailing wildcard is allowed.
    pub subject_pattern: String,
    /// Redelivery window for unacknowledged messages.
    pub ack_wait_seconds: u64,
    /// Bounded delivery attempts per message, including the first.
    pub max_deliveries: u32,
}

impl NatsConfig {
    /// Redelivery window as a [`Duration`].
    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_seconds)
    }
}

/// A tenant route: the domain and its webhook endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Tenant identifier, matched against the event's `domain` field.
    pub domain: String,
    /// Target webhook URLs, all of which must acknowledge each event.
    pub endpoints: Vec<String>,
}

impl Config {
    /// Reads, parses, and validates the configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, is not valid
    /// YAML, or fails a validation rule.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks every validation rule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server port must be positive".into()));
        }

        if self.nats.url.is_empty() {
            return Err(ConfigError::Invalid("nats url is required".into()));
        }

        if self.nats.stream_name.is_empty() {
            return Err(ConfigError::Invalid("nats stream_name is required".into()));
        }

        if self.nats.subject_pattern.is_empty() {
            return Err(ConfigError::Invalid("nats subject_pattern is required".into()));
        }

        if self.nats.max_deliveries == 0 {
            return Err(ConfigError::Invalid("nats max_deliveries must be at least 1".into()));
        }

        // A redelivery window at or below the endpoint timeout would let the
        // stream redeliver while the prior fan-out is still in flight.
        if self.nats.ack_wait_seconds <= FORWARD_TIMEOUT.as_secs() {
            return Err(ConfigError::Invalid(format!(
                "nats ack_wait_seconds ({}) must be greater than the backend timeout ({} seconds)",
                self.nats.ack_wait_seconds,
                FORWARD_TIMEOUT.as_secs()
            )));
        }

        for route in &self.routes {
            if route.domain.is_empty() {
                return Err(ConfigError::Invalid("route domain must not be empty".into()));
            }
            for endpoint in &route.endpoints {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err(ConfigError::Invalid(format!(
                        "route {} endpoint {} is not an absolute http(s) URL",
                        route.domain, endpoint
                    )));
                }
            }
        }

        Ok(())
    }

    /// Returns the endpoints configured for a domain, if any.
    ///
    /// When a domain appears in more than one route, the first route wins.
    pub fn endpoints_for(&self, domain: &str) -> Option<&[String]> {
        self.routes
            .iter()
            .find(|route| route.domain == domain)
            .map(|route| route.endpoints.as_slice())
    }

    /// Builds the domain → endpoints map for the route table.
    ///
    /// First-wins on duplicate domains, matching [`Config::endpoints_for`].
    pub fn route_map(&self) -> HashMap<String, Vec<String>> {
        let mut map = HashMap::with_capacity(self.routes.len());
        for route in &self.routes {
            map.entry(route.domain.clone())
                .or_insert_with(|| route.endpoints.clone());
        }
        map
    }
}

fn default_server_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const VALID_YAML: &str = r"
server:
  port: 8080
  read_timeout_seconds: 10
  write_timeout_seconds: 10
nats:
  url: nats://localhost:4222
  stream_name: CALL_EVENTS
  subject_pattern: call.signal.*
  ack_wait_seconds: 10
  max_deliveries: 3
routes:
  - domain: t.example
    endpoints:
      - http://backend-a.example/hook
      - https://backend-b.example/hook
";

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(yaml.as_bytes()).expect("write temp config");
        file
    }

    fn valid_config() -> Config {
        serde_yaml::from_str(VALID_YAML).expect("valid yaml")
    }

    #[test]
    fn loads_valid_config() {
        let file = write_config(VALID_YAML);
        let config = Config::load(file.path()).expect("config should load");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.nats.stream_name, "CALL_EVENTS");
        assert_eq!(config.nats.ack_wait(), Duration::from_secs(10));
        assert_eq!(config.routes.len(), 1);
        assert_eq!(
            config.endpoints_for("t.example").map(<[String]>::len),
            Some(2)
        );
        assert_eq!(config.endpoints_for("unknown.example"), None);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load("/nonexistent/config.yaml").expect_err("load should fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let file = write_config("server: [not a mapping");
        let err = Config::load(file.path()).expect_err("load should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn ack_wait_must_exceed_forward_timeout() {
        let mut config = valid_config();
        config.nats.ack_wait_seconds = 3;
        let err = config.validate().expect_err("validation should fail");
        assert!(err.to_string().contains("ack_wait_seconds"));

        config.nats.ack_wait_seconds = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_values_rejected() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.nats.max_deliveries = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.nats.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn relative_endpoint_url_rejected() {
        let mut config = valid_config();
        config.routes[0].endpoints.push("backend-c.example/hook".into());
        let err = config.validate().expect_err("validation should fail");
        assert!(err.to_string().contains("backend-c.example"));
    }

    #[test]
    fn unknown_yaml_keys_are_ignored() {
        let yaml = format!("{VALID_YAML}\nlogging:\n  file: /var/log/broker.log\n");
        let file = write_config(&yaml);
        assert!(Config::load(file.path()).is_ok());
    }

    #[test]
    fn duplicate_domain_first_route_wins() {
        let mut config = valid_config();
        config.routes.push(Route {
            domain: "t.example".into(),
            endpoints: vec!["http://late.example/hook".into()],
        });

        assert_eq!(
            config.endpoints_for("t.example").map(<[String]>::len),
            Some(2)
        );
        assert_eq!(config.route_map().get("t.example").map(Vec::len), Some(2));
    }
}
