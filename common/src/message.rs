use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for messages
pub type MessageId = String;

/// A message submitted by a producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Used for deduplication, tracing and acknowledgement
    pub id: MessageId,

    /// Selects the push target through routing rules
    pub routing_key: String,

    pub payload: Vec<u8>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,

    pub created_at: DateTime<Utc>,

    /// Delivery time. `None` means deliver immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(routing_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            routing_key: routing_key.into(),
            payload: Vec::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
            scheduled_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_metadata_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }

    /// Schedule delivery `delay` from now
    pub fn with_delay(mut self, delay: Duration) -> Self {
        let now = Utc::now();
        let scheduled_at = TimeDelta::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.scheduled_at = Some(scheduled_at);
        self
    }

    /// Time left until delivery, relative to `now`. Negative when overdue,
    /// zero when no delivery time was set.
    pub fn delay_at(&self, now: DateTime<Utc>) -> TimeDelta {
        match self.scheduled_at {
            Some(scheduled_at) => scheduled_at - now,
            None => TimeDelta::zero(),
        }
    }
}
