use std::fmt;

pub const DEFAULT_KEY_PREFIX: &str = "/delayline";

/// Entity families stored under their own key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Nodes,
    Gateways,
    Storages,
    Pushers,
    RoutingRules,
}

impl Family {
    pub fn segment(&self) -> &'static str {
        match self {
            Family::Nodes => "nodes",
            Family::Gateways => "gateways",
            Family::Storages => "storages",
            Family::Pushers => "pushers",
            Family::RoutingRules => "routing-rules",
        }
    }

    /// Singular name used in error messages
    pub fn entity(&self) -> &'static str {
        match self {
            Family::Nodes => "node",
            Family::Gateways => "gateway",
            Family::Storages => "storage",
            Family::Pushers => "pusher",
            Family::RoutingRules => "routing rule",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Configuration singletons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Singleton {
    ClusterConfig,
    CoordinatorConfig,
}

impl Singleton {
    pub fn segment(&self) -> &'static str {
        match self {
            Singleton::ClusterConfig => "cluster-config",
            Singleton::CoordinatorConfig => "coordinator-config",
        }
    }
}

/// Hierarchical key layout: `{root}/{family}/{id}` and `{root}/{singleton}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    root: String,
}

impl KeySpace {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let trimmed = root.trim_end_matches('/');
        let root = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self { root }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Prefix for range reads; always ends with `/` so `storages/` never
    /// matches a sibling like `storages-archive/`.
    pub fn prefix(&self, family: Family) -> String {
        format!("{}/{}/", self.root, family.segment())
    }

    pub fn key(&self, family: Family, id: &str) -> String {
        format!("{}{}", self.prefix(family), id)
    }

    pub fn singleton(&self, singleton: Singleton) -> String {
        format!("{}/{}", self.root, singleton.segment())
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}
