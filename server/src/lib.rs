//! Coordinator process: configuration loading and the registry HTTP API.

pub mod config;
pub mod health;
pub mod rest;

pub use crate::config::{BackendKind, Cli, ServerConfig};
pub use delayline_cluster::api::ApiResponse;
pub use rest::{create_router, start_rest_server, AppState};

/// Register descriptions for the counters emitted by the registry layer
pub fn describe_metrics() {
    metrics::describe_counter!(
        "registry.list.skipped",
        "Registry records skipped during a list because they failed to decode"
    );
    metrics::describe_counter!(
        "gateway.refresh.completed",
        "Routing snapshots published by gateway refresh passes"
    );
    metrics::describe_counter!(
        "gateway.refresh.failures",
        "Per-family fetch failures during gateway refresh"
    );
    metrics::describe_counter!("gateway.messages.routed", "Messages dispatched by gateways");
    metrics::describe_counter!("gateway.messages.dropped", "Messages with no route");
}
