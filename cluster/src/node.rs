use crate::types::*;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use crate::types::{NodeId, NodeStatus};

/// A coordinator process registered in the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: NodeId,
    pub address: String,
    pub status: NodeStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl ClusterNode {
    /// New nodes start `Connecting` until their first heartbeat
    pub fn new(id: NodeId, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            address: address.into(),
            status: NodeStatus::Connecting,
            registered_at: now,
            last_heartbeat: now,
        }
    }
}

/// Liveness bookkeeping common to every registered record
pub trait Heartbeat {
    fn record_id(&self) -> String;

    fn status(&self) -> NodeStatus;

    fn last_heartbeat(&self) -> DateTime<Utc>;

    fn set_status(&mut self, status: NodeStatus);

    fn set_last_heartbeat(&mut self, at: DateTime<Utc>);

    fn is_active(&self) -> bool {
        self.status() == NodeStatus::Active
    }

    /// Active and heard from within `timeout` of `now`
    fn is_alive(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        let Ok(timeout) = TimeDelta::from_std(timeout) else {
            return self.is_active();
        };
        self.is_active() && now - self.last_heartbeat() < timeout
    }

    /// Record a heartbeat. The timestamp only moves forward.
    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_heartbeat() {
            self.set_last_heartbeat(now);
        }
        self.set_status(NodeStatus::Active);
    }
}

macro_rules! impl_heartbeat {
    ($($record:ty),+ $(,)?) => {
        $(
            impl Heartbeat for $record {
                fn record_id(&self) -> String {
                    self.id.to_string()
                }

                fn status(&self) -> NodeStatus {
                    self.status
                }

                fn last_heartbeat(&self) -> DateTime<Utc> {
                    self.last_heartbeat
                }

                fn set_status(&mut self, status: NodeStatus) {
                    self.status = status;
                }

                fn set_last_heartbeat(&mut self, at: DateTime<Utc>) {
                    self.last_heartbeat = at;
                }
            }
        )+
    };
}

impl_heartbeat!(ClusterNode, GatewayInfo, StorageInfo, PusherInfo);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_creation() {
        let node_id = NodeId::new();
        let node = ClusterNode::new(node_id, "10.0.0.1:8080");

        assert_eq!(node.id, node_id);
        assert_eq!(node.status(), NodeStatus::Connecting);
        assert_eq!(node.registered_at, node.last_heartbeat);
        assert!(!node.is_alive(Duration::from_secs(30), Utc::now()));
    }

    #[test]
    fn test_touch_activates_and_only_advances() {
        let mut node = ClusterNode::new(NodeId::new(), "10.0.0.1:8080");
        let later = node.last_heartbeat + TimeDelta::seconds(10);

        node.touch(later);
        assert_eq!(node.status(), NodeStatus::Active);
        assert_eq!(node.last_heartbeat(), later);

        node.touch(later - TimeDelta::seconds(5));
        assert_eq!(node.last_heartbeat(), later);
    }

    #[test]
    fn test_is_alive_window() {
        let mut gateway = GatewayInfo::new("gw-1", "10.0.0.2:7000");
        let seen = gateway.last_heartbeat;
        let timeout = Duration::from_secs(30);

        assert!(gateway.is_alive(timeout, seen + TimeDelta::seconds(29)));
        assert!(!gateway.is_alive(timeout, seen + TimeDelta::seconds(30)));

        gateway.set_status(NodeStatus::Removed);
        assert!(!gateway.is_alive(timeout, seen));
    }
}
