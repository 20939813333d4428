use chrono::{DateTime, Utc};
use delayline_common::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Identifier of a coordinator node. Assigned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| BrokerError::invalid_input(format!("invalid node id '{}': {}", s, e)))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle shared by every registered record.
///
/// `Connecting -> Active -> Removed`; `Removed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Connecting,
    Active,
    Removed,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Connecting => write!(f, "Connecting"),
            NodeStatus::Active => write!(f, "Active"),
            NodeStatus::Removed => write!(f, "Removed"),
        }
    }
}

/// Ingestion node record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayInfo {
    pub id: String,
    pub address: String,
    pub status: NodeStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl GatewayInfo {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            address: address.into(),
            status: NodeStatus::Active,
            registered_at: now,
            last_heartbeat: now,
        }
    }
}

/// Delay-tier storage record.
///
/// A message with delay `d` belongs here when
/// `min_delay <= d` and (`max_delay == 0` or `d < max_delay`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub id: String,
    pub address: String,

    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,

    /// Zero means no upper bound
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    pub status: NodeStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl StorageInfo {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        min_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            address: address.into(),
            min_delay,
            max_delay,
            status: NodeStatus::Active,
            registered_at: now,
            last_heartbeat: now,
        }
    }

    pub fn accepts_delay(&self, delay: Duration) -> bool {
        if delay < self.min_delay {
            return false;
        }
        self.max_delay.is_zero() || delay < self.max_delay
    }
}

/// Push target record. `kind` names the transport family
/// (`http`, `kafka`, `grpc`, ...) and never takes part in matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherInfo {
    pub id: String,
    pub kind: String,
    pub address: String,
    pub status: NodeStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl PusherInfo {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind: kind.into(),
            address: address.into(),
            status: NodeStatus::Active,
            registered_at: now,
            last_heartbeat: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Full string equality
    Exact,
    Prefix,
    Suffix,
    /// Unanchored regex search
    Regex,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchType::Exact => write!(f, "exact"),
            MatchType::Prefix => write!(f, "prefix"),
            MatchType::Suffix => write!(f, "suffix"),
            MatchType::Regex => write!(f, "regex"),
        }
    }
}

/// Links a routing key pattern to a pusher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    #[serde(default)]
    pub id: String,
    pub pattern: String,
    pub match_type: MatchType,
    pub pusher_id: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl RoutingRule {
    pub fn new(
        id: impl Into<String>,
        pattern: impl Into<String>,
        match_type: MatchType,
        pusher_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
            match_type,
            pusher_id: pusher_id.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        require("id", &self.id)?;
        require("pattern", &self.pattern)?;
        require("pusher_id", &self.pusher_id)
    }
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BrokerError::invalid_input(format!("{} is required", field)));
    }
    Ok(())
}

/// Cluster-wide settings shared with every role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Message bus address used for storage and push dispatch
    #[serde(default)]
    pub transport_address: String,
}

/// Coordinator settings as published to the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub http_addr: String,

    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(default)]
    pub backend: String,

    #[serde(default)]
    pub backend_endpoints: Vec<String>,

    #[serde(default, with = "humantime_serde")]
    pub op_timeout: Duration,

    #[serde(default)]
    pub log_level: String,
}
