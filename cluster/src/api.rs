//! Request and response bodies of the registry HTTP API, shared by the
//! coordinator and the SDK client.

use crate::types::{NodeStatus, StorageInfo};
use chrono::{DateTime, Utc};
use delayline_common::duration::{format_delay, format_max_delay, parse_delay, parse_max_delay};
use delayline_common::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Version prefix of every registry route
pub const API_PREFIX: &str = "/api/v1";

/// REST API response wrapper
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNodeRequest {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterGatewayRequest {
    pub id: String,
    pub address: String,
}

/// Delays are human strings: `"0s"`, `"1m"`, `"1h 30m"`. An empty, `"0"` or
/// `"unlimited"` upper bound means no bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterStorageRequest {
    pub id: String,
    pub address: String,
    #[serde(default = "zero_delay")]
    pub min_delay: String,
    #[serde(default)]
    pub max_delay: String,
}

fn zero_delay() -> String {
    "0s".to_string()
}

impl RegisterStorageRequest {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        min_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            min_delay: format_delay(min_delay),
            max_delay: format_max_delay(max_delay),
        }
    }

    pub fn delays(&self) -> Result<(Duration, Duration)> {
        let min_delay = parse_delay("min_delay", &self.min_delay)?;
        let max_delay = parse_max_delay("max_delay", &self.max_delay)?;
        Ok((min_delay, max_delay))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPusherRequest {
    pub id: String,
    #[serde(alias = "type")]
    pub kind: String,
    pub address: String,
}

/// Storage record as rendered by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageResponse {
    pub id: String,
    pub address: String,
    pub min_delay: String,
    pub max_delay: String,
    pub status: NodeStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl From<&StorageInfo> for StorageResponse {
    fn from(storage: &StorageInfo) -> Self {
        Self {
            id: storage.id.clone(),
            address: storage.address.clone(),
            min_delay: format_delay(storage.min_delay),
            max_delay: format_max_delay(storage.max_delay),
            status: storage.status,
            registered_at: storage.registered_at,
            last_heartbeat: storage.last_heartbeat,
        }
    }
}

impl TryFrom<StorageResponse> for StorageInfo {
    type Error = delayline_common::BrokerError;

    fn try_from(response: StorageResponse) -> Result<Self> {
        Ok(StorageInfo {
            min_delay: parse_delay("min_delay", &response.min_delay)?,
            max_delay: parse_max_delay("max_delay", &response.max_delay)?,
            id: response.id,
            address: response.address,
            status: response.status,
            registered_at: response.registered_at,
            last_heartbeat: response.last_heartbeat,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_request_delays() {
        let request: RegisterStorageRequest =
            serde_json::from_str(r#"{"id":"s3","address":"s3://b","min_delay":"1h","max_delay":"0"}"#)
                .unwrap();
        assert_eq!(
            request.delays().unwrap(),
            (Duration::from_secs(3600), Duration::ZERO)
        );

        let defaulted: RegisterStorageRequest =
            serde_json::from_str(r#"{"id":"r","address":"redis"}"#).unwrap();
        assert_eq!(defaulted.delays().unwrap(), (Duration::ZERO, Duration::ZERO));

        let bad = RegisterStorageRequest {
            max_delay: "forever".to_string(),
            ..defaulted
        };
        assert!(bad.delays().is_err());
    }

    #[test]
    fn test_storage_response_rendering() {
        let storage = StorageInfo::new("slow", "s3://b", Duration::from_secs(3600), Duration::ZERO);
        let response = StorageResponse::from(&storage);
        assert_eq!(response.min_delay, "1h");
        assert_eq!(response.max_delay, "unlimited");

        let back = StorageInfo::try_from(response).unwrap();
        assert_eq!(back, storage);
    }

    #[test]
    fn test_pusher_request_accepts_type_alias() {
        let request: RegisterPusherRequest =
            serde_json::from_str(r#"{"id":"p","type":"kafka","address":"k:9092"}"#).unwrap();
        assert_eq!(request.kind, "kafka");
    }
}
