use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{EventSink, SinkAck, SinkError};
use crate::models::IngestedEvent;

/// Row shape shared with the Postgres store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub event_name: String,
    pub event_time: DateTime<Utc>,
    pub payload: Value,
    pub webhook_id: String,
}

/// In-memory store sink for local runs and tests.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn records(&self) -> Vec<StoredRecord> {
        self.records.lock().await.clone()
    }

    #[cfg(test)]
    pub async fn get(&self, id: i64) -> Option<StoredRecord> {
        self.records.lock().await.iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn publish(&self, event: &IngestedEvent) -> Result<SinkAck, SinkError> {
        let webhook_id = event.webhook_id();
        let mut records = self.records.lock().await;

        // same constraint as the UNIQUE column in Postgres
        if records.iter().any(|r| r.webhook_id == webhook_id) {
            return Err(SinkError::Rejected(format!(
                "duplicate webhook_id {webhook_id}"
            )));
        }

        let id = records.last().map_or(1, |r| r.id + 1);
        records.push(StoredRecord {
            id,
            event_name: event.name.clone(),
            event_time: event.occurred_at,
            payload: event.payload.clone(),
            webhook_id: webhook_id.clone(),
        });

        Ok(SinkAck::Stored {
            record_id: id,
            webhook_id,
        })
    }
}
