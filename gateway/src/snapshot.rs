use chrono::{DateTime, Utc};
use delayline_cluster::{MatchType, PusherInfo, RoutingRule, StorageInfo};
use regex::Regex;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Matcher {
    Exact,
    Prefix,
    Suffix,
    Regex(Regex),
    /// Pattern failed to compile; never matches
    Invalid(String),
}

/// A routing rule with its matcher prepared for the snapshot it lives in.
/// The compiled form is never written back to the registry.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: RoutingRule,
    matcher: Matcher,
}

impl CompiledRule {
    pub fn compile(rule: RoutingRule) -> Self {
        let matcher = match rule.match_type {
            MatchType::Exact => Matcher::Exact,
            MatchType::Prefix => Matcher::Prefix,
            MatchType::Suffix => Matcher::Suffix,
            MatchType::Regex => match Regex::new(&rule.pattern) {
                Ok(regex) => Matcher::Regex(regex),
                Err(e) => {
                    tracing::warn!(
                        "Routing rule '{}' has an invalid pattern '{}': {}",
                        rule.id,
                        rule.pattern,
                        e
                    );
                    Matcher::Invalid(e.to_string())
                }
            },
        };

        Self { rule, matcher }
    }

    pub fn rule(&self) -> &RoutingRule {
        &self.rule
    }

    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn pusher_id(&self) -> &str {
        &self.rule.pusher_id
    }

    pub fn is_enabled(&self) -> bool {
        self.rule.enabled
    }

    /// Compile error for a regex rule that can never match
    pub fn compile_error(&self) -> Option<&str> {
        match &self.matcher {
            Matcher::Invalid(error) => Some(error),
            _ => None,
        }
    }

    /// Pattern test only; the enabled flag is checked by the router
    pub fn matches(&self, routing_key: &str) -> bool {
        let pattern = self.rule.pattern.as_str();
        match &self.matcher {
            Matcher::Exact => routing_key == pattern,
            Matcher::Prefix => routing_key.starts_with(pattern),
            Matcher::Suffix => routing_key.ends_with(pattern),
            Matcher::Regex(regex) => regex.is_match(routing_key),
            Matcher::Invalid(_) => false,
        }
    }
}

/// One published generation of routing data. Immutable once built; a
/// refresh replaces the whole value.
#[derive(Debug, Clone, Default)]
pub struct RoutingSnapshot {
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub storages: Arc<Vec<StorageInfo>>,
    pub pushers: Arc<Vec<PusherInfo>>,
    pub rules: Arc<Vec<CompiledRule>>,
}

impl RoutingSnapshot {
    /// Generation 0: nothing fetched yet
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn compile_rules(rules: Vec<RoutingRule>) -> Vec<CompiledRule> {
        rules.into_iter().map(CompiledRule::compile).collect()
    }

    pub fn invalid_rule_ids(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| rule.compile_error().is_some())
            .map(|rule| rule.id().to_string())
            .collect()
    }

    pub fn pusher(&self, id: &str) -> Option<&PusherInfo> {
        self.pushers.iter().find(|pusher| pusher.id == id)
    }

    pub fn storage(&self, id: &str) -> Option<&StorageInfo> {
        self.storages.iter().find(|storage| storage.id == id)
    }
}
