use delayline_common::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ingestion node settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Identity registered in the cluster registry
    pub gateway_id: String,

    /// Address advertised to the registry
    pub address: String,

    #[serde(with = "humantime_serde")]
    pub refresh_period: Duration,

    #[serde(with = "humantime_serde")]
    pub heartbeat_period: Duration,

    /// Messages due within this window skip storage and go straight to a pusher
    #[serde(with = "humantime_serde")]
    pub immediate_dispatch_threshold: Duration,

    /// Upper bound for a single transport publish
    #[serde(with = "humantime_serde")]
    pub dispatch_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_id: "gateway-1".to_string(),
            address: "127.0.0.1:8081".to_string(),
            refresh_period: Duration::from_secs(10),
            heartbeat_period: Duration::from_secs(5),
            immediate_dispatch_threshold: Duration::from_millis(10),
            dispatch_timeout: Duration::from_secs(5),
        }
    }
}

impl GatewayConfig {
    pub fn new(gateway_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_refresh_period(mut self, period: Duration) -> Self {
        self.refresh_period = period;
        self
    }

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    pub fn with_immediate_dispatch_threshold(mut self, threshold: Duration) -> Self {
        self.immediate_dispatch_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway_id.trim().is_empty() {
            return Err(BrokerError::invalid_input("gateway_id cannot be empty"));
        }
        if self.address.trim().is_empty() {
            return Err(BrokerError::invalid_input("address cannot be empty"));
        }
        if self.refresh_period.is_zero() {
            return Err(BrokerError::invalid_input("refresh_period must be greater than 0"));
        }
        if self.heartbeat_period.is_zero() {
            return Err(BrokerError::invalid_input("heartbeat_period must be greater than 0"));
        }
        if self.dispatch_timeout.is_zero() {
            return Err(BrokerError::invalid_input("dispatch_timeout must be greater than 0"));
        }
        Ok(())
    }
}
