use crate::node::Heartbeat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Alive/stale split of one record family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FamilyLiveness {
    pub alive: Vec<String>,
    pub stale: Vec<String>,
}

impl FamilyLiveness {
    pub fn total(&self) -> usize {
        self.alive.len() + self.stale.len()
    }
}

/// Liveness of every registered record at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessReport {
    pub checked_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub nodes: FamilyLiveness,
    pub gateways: FamilyLiveness,
    pub storages: FamilyLiveness,
    pub pushers: FamilyLiveness,
}

/// Classifies records by heartbeat age. The timeout is supplied by the
/// caller and never stored.
#[derive(Debug, Clone, Copy)]
pub struct LivenessChecker {
    timeout: Duration,
}

impl LivenessChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn classify<R: Heartbeat>(&self, records: &[R], now: DateTime<Utc>) -> FamilyLiveness {
        let mut liveness = FamilyLiveness::default();
        for record in records {
            if record.is_alive(self.timeout, now) {
                liveness.alive.push(record.record_id());
            } else {
                liveness.stale.push(record.record_id());
            }
        }
        liveness
    }
}
