//! Downstream handoff for accepted events.
//!
//! The ingestion endpoint only sees [`EventSink`]. Concrete backends:
//! - [`QueueSink`]: fire-and-forget publish to an AMQP queue
//! - [`StoreSink`]: durable insert into a Postgres event table
//! - [`MemorySink`]: the store contract kept in process memory
//!
//! No sink retries. A failure is returned once and the caller decides.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::IngestedEvent;

mod memory;
mod queue;
mod store;

pub use memory::MemorySink;
pub use queue::{QueueOptions, QueueSink};
pub use store::StoreSink;

/// What a sink hands back once it has taken the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkAck {
    Queued { queued_at: DateTime<Utc> },
    Stored { record_id: i64, webhook_id: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    /// No channel or connection is established.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the record (constraint or validation failure).
    #[error("sink rejected event: {0}")]
    Rejected(String),

    /// Anything else that went wrong during publish.
    #[error("sink publish failed: {0}")]
    Failed(String),
}

impl SinkError {
    // label value for the sink failure metric
    pub fn kind(&self) -> &'static str {
        match self {
            SinkError::Unavailable(_) => "unavailable",
            SinkError::Rejected(_) => "rejected",
            SinkError::Failed(_) => "failed",
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Short backend name used in logs, metrics and `/health`.
    fn name(&self) -> &'static str;

    /// Whether a connection to the backend is currently established.
    fn is_ready(&self) -> bool;

    async fn publish(&self, event: &IngestedEvent) -> Result<SinkAck, SinkError>;
}
