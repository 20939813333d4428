use crate::snapshot::{CompiledRule, RoutingSnapshot};
use chrono::{DateTime, TimeDelta, Utc};
use delayline_cluster::StorageInfo;
use delayline_common::Message;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a message goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum RouteDecision {
    /// Stage in a delay tier
    Storage { storage_id: String },

    /// Deliver now through a pusher
    Push { pusher_id: String, rule_id: String },

    /// No tier and no enabled rule accepted the message
    Dropped,
}

impl RouteDecision {
    pub fn is_dropped(&self) -> bool {
        matches!(self, RouteDecision::Dropped)
    }

    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            RouteDecision::Storage { .. } => "storage",
            RouteDecision::Push { .. } => "pusher",
            RouteDecision::Dropped => "dropped",
        }
    }
}

/// First tier, in list order, whose `[min_delay, max_delay)` accepts `delay`.
/// Overdue messages (negative delay) are treated as due now.
pub fn select_tier(storages: &[StorageInfo], delay: TimeDelta) -> Option<&StorageInfo> {
    let delay = delay.to_std().unwrap_or(Duration::ZERO);
    storages.iter().find(|storage| storage.accepts_delay(delay))
}

/// First enabled rule, in list order, whose pattern accepts the key.
/// Rules may overlap; the earliest one wins even if a later one is more
/// specific.
pub fn match_rule<'a>(rules: &'a [CompiledRule], routing_key: &str) -> Option<&'a CompiledRule> {
    rules
        .iter()
        .find(|rule| rule.is_enabled() && rule.matches(routing_key))
}

/// Routing decision engine. Pure and infallible: every message gets a
/// storage tier, a pusher or [`RouteDecision::Dropped`].
#[derive(Debug, Clone, Copy)]
pub struct Router {
    immediate_dispatch_threshold: Duration,
}

impl Router {
    pub fn new(immediate_dispatch_threshold: Duration) -> Self {
        Self {
            immediate_dispatch_threshold,
        }
    }

    pub fn decide(
        &self,
        snapshot: &RoutingSnapshot,
        message: &Message,
        now: DateTime<Utc>,
    ) -> RouteDecision {
        let delay = message.delay_at(now);
        let threshold =
            TimeDelta::from_std(self.immediate_dispatch_threshold).unwrap_or(TimeDelta::MAX);

        if delay > threshold {
            if let Some(storage) = select_tier(&snapshot.storages, delay) {
                return RouteDecision::Storage {
                    storage_id: storage.id.clone(),
                };
            }

            tracing::debug!(
                "No storage tier accepts delay {} for message {}, falling back to push",
                delay,
                message.id
            );
        }

        self.decide_push(snapshot, &message.routing_key)
    }

    pub fn decide_push(&self, snapshot: &RoutingSnapshot, routing_key: &str) -> RouteDecision {
        match match_rule(&snapshot.rules, routing_key) {
            Some(rule) => RouteDecision::Push {
                pusher_id: rule.pusher_id().to_string(),
                rule_id: rule.id().to_string(),
            },
            None => RouteDecision::Dropped,
        }
    }
}
