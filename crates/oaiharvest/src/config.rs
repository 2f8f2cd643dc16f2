//! Harvester configuration.
//!
//! Durations are whole seconds when (de)serialized, so a configuration can be
//! embedded in the caller's own TOML or JSON settings:
//!
//! ```
//! # use oaiharvest::HarvesterConfig;
//! # use std::time::Duration;
//! let config: HarvesterConfig = serde_json::from_str(r#"{"number_of_retries": 5}"#).unwrap();
//! assert_eq!(config.number_of_retries, 5);
//! assert_eq!(config.time_between_retries, Duration::from_secs(5));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use oaiharvest_core::{Result, SetupError};

/// Default number of retries after a failed request.
pub const DEFAULT_NUMBER_OF_RETRIES: u32 = 3;

/// Default wait between two attempts.
pub const DEFAULT_TIME_BETWEEN_RETRIES: Duration = Duration::from_secs(5);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(300);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings shared by every connection a harvester opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Retries after the first failed attempt of a request.
    pub number_of_retries: u32,

    /// Wait between two attempts.
    #[serde(with = "seconds")]
    pub time_between_retries: Duration,

    /// Bound on establishing a TCP/TLS connection.
    #[serde(with = "seconds")]
    pub connect_timeout: Duration,

    /// Bound on a whole request, including reading the response.
    #[serde(with = "seconds")]
    pub socket_timeout: Duration,

    /// Bound on obtaining a usable connection before the request is sent.
    #[serde(with = "seconds")]
    pub request_timeout: Duration,

    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            number_of_retries: DEFAULT_NUMBER_OF_RETRIES,
            time_between_retries: DEFAULT_TIME_BETWEEN_RETRIES,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: concat!("oaiharvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HarvesterConfig {
    pub fn with_number_of_retries(mut self, number_of_retries: u32) -> Self {
        self.number_of_retries = number_of_retries;
        self
    }

    pub fn with_time_between_retries(mut self, time_between_retries: Duration) -> Self {
        self.time_between_retries = time_between_retries;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_socket_timeout(mut self, socket_timeout: Duration) -> Self {
        self.socket_timeout = socket_timeout;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Check the settings for values no client can work with.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("connect_timeout", self.connect_timeout),
            ("socket_timeout", self.socket_timeout),
            ("request_timeout", self.request_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(SetupError::Config {
                    message: format!("{name} must be greater than zero"),
                }
                .into());
            }
        }
        if self.user_agent.trim().is_empty() {
            return Err(SetupError::Config {
                message: "user_agent cannot be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Effective bound on connection establishment.
    ///
    /// The HTTP client opens connections on demand, so acquiring a connection
    /// and connecting are the same step. The tighter of the two limits wins.
    pub(crate) fn effective_connect_timeout(&self) -> Duration {
        self.connect_timeout.min(self.request_timeout)
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
