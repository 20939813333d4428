//! Ingestion process: accepts messages over HTTP and routes them through a
//! [`delayline_gateway::Gateway`] fed by a remote coordinator.

pub mod config;
pub mod rest;
pub mod transport;

pub use crate::config::{Cli, IngestConfig};
pub use rest::{create_router, start_rest_server, AppState, MessageRequest, MessageResponse};
pub use transport::LogTransport;

/// Register descriptions for the counters emitted by the gateway
pub fn describe_metrics() {
    metrics::describe_counter!(
        "gateway.refresh.completed",
        "Routing snapshots published by refresh passes"
    );
    metrics::describe_counter!(
        "gateway.refresh.failures",
        "Per-family fetch failures during refresh"
    );
    metrics::describe_counter!("gateway.messages.routed", "Messages dispatched to a tier or pusher");
    metrics::describe_counter!("gateway.messages.dropped", "Messages with no route");
    metrics::describe_counter!(
        "gateway.transport.published",
        "Dispatches recorded by the log transport"
    );
}
