use delayline_common::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for [`crate::RestClient`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Coordinator base URL, e.g. `http://coordinator:8080`
    pub endpoint: String,
    pub timeout_seconds: u64,
    /// Extra attempts after the first for retryable failures
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            timeout_seconds: 10,
            max_retries: 3,
            retry_delay_ms: 100,
            user_agent: format!("delayline-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(BrokerError::invalid_input("endpoint cannot be empty"));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(BrokerError::invalid_input(format!(
                "endpoint must start with http:// or https://, got '{}'",
                self.endpoint
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(BrokerError::invalid_input("timeout_seconds must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.user_agent.starts_with("delayline-client/"));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::new("coordinator:8080").validate().is_err());

        let config = ClientConfig {
            timeout_seconds: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
