pub mod cache;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod router;
pub mod snapshot;
pub mod source;

pub use cache::{FailedFetch, RefreshReport, SnapshotCache};
pub use config::GatewayConfig;
pub use dispatch::{push_subject, storage_subject, ChannelTransport, Dispatched, Transport};
pub use gateway::{Gateway, GatewayContext};
pub use router::{match_rule, select_tier, RouteDecision, Router};
pub use snapshot::{CompiledRule, RoutingSnapshot};
pub use source::RegistrySource;
