pub mod api;
pub mod health;
pub mod node;
pub mod registry;
pub mod types;

pub use health::{FamilyLiveness, LivenessChecker, LivenessReport};
pub use node::{ClusterNode, Heartbeat};
pub use registry::ClusterRegistry;
pub use types::*;
