use crate::router::RouteDecision;
use async_trait::async_trait;
use delayline_common::{BrokerError, Result};
use tokio::sync::mpsc;

pub const SUBJECT_PREFIX: &str = "delayline";

pub fn storage_subject(storage_id: &str) -> String {
    format!("{}.storage.{}", SUBJECT_PREFIX, storage_id)
}

pub fn push_subject(pusher_id: &str) -> String {
    format!("{}.push.{}", SUBJECT_PREFIX, pusher_id)
}

/// Subject for a routing decision; `None` for dropped messages
pub fn subject_for(decision: &RouteDecision) -> Option<String> {
    match decision {
        RouteDecision::Storage { storage_id } => Some(storage_subject(storage_id)),
        RouteDecision::Push { pusher_id, .. } => Some(push_subject(pusher_id)),
        RouteDecision::Dropped => None,
    }
}

/// Message bus seam. One fire-and-forget publish per routed message;
/// delivery semantics belong to the bus.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;
}

/// A message handed to the bus
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// In-process transport backed by a bounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<Dispatched>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Dispatched>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.sender
            .send(Dispatched {
                subject: subject.to_string(),
                payload,
            })
            .await
            .map_err(|_| BrokerError::Transport {
                subject: subject.to_string(),
                message: "channel closed".to_string(),
            })
    }
}
