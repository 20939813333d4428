use async_trait::async_trait;
use delayline_common::Result;
use delayline_gateway::Transport;
use metrics::counter;
use tracing::info;

/// Transport that records each dispatch in the log instead of handing it to
/// a message bus. Used when no bus adapter is wired into the process.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

impl LogTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        info!(subject, bytes = payload.len(), "Dispatched message");
        counter!("gateway.transport.published", "subject" => subject.to_string()).increment(1);
        Ok(())
    }
}
