use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::random::{RandomSource, source_id};
use crate::rate_limit::AdmissionDecision;

// event name used when the submitted message carries none
pub const DEFAULT_EVENT_NAME: &str = "message.sent";

pub const WEBHOOK_ID_PREFIX: &str = "WH-";

// An accepted event, immutable once built and handed to a sink
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedEvent {
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
    pub source_id: String,
}

impl IngestedEvent {
    // Build from the `message` field of an /api/send body
    pub fn from_message(message: Value, now: DateTime<Utc>, random: &dyn RandomSource) -> Self {
        let name = message
            .get("event_name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_EVENT_NAME)
            .to_string();

        Self {
            name,
            occurred_at: now,
            payload: message,
            source_id: source_id(random),
        }
    }

    pub fn webhook_id(&self) -> String {
        format!("{}{}", WEBHOOK_ID_PREFIX, self.source_id)
    }
}

// JS toISOString() shape, e.g. 2025-01-01T00:00:00.000Z
pub fn iso_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: String,
}

impl From<&AdmissionDecision> for RateLimitInfo {
    fn from(d: &AdmissionDecision) -> Self {
        Self {
            limit: d.limit,
            remaining: d.remaining,
            reset_time: iso_millis(d.reset_at),
        }
    }
}

// 200 body of /customer-webhook
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEcho {
    pub success: bool,
    pub message: &'static str,
    pub received_data: Value,
    pub timestamp: String,
    pub rate_limit: RateLimitInfo,
}

// 200 body of /api/send, shaped per sink
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SendResponse {
    #[serde(rename_all = "camelCase")]
    Queued {
        success: bool,
        message: &'static str,
        queued_at: String,
    },
    #[serde(rename_all = "camelCase")]
    Stored {
        success: bool,
        message: &'static str,
        event_id: i64,
        webhook_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{SOURCE_ID_BYTES, ThreadRandom};
    use serde_json::json;

    #[test]
    fn event_name_taken_from_message_object() {
        let msg = json!({"event_name": "subscriber.created", "subscriber": {"id": "1"}});
        let ev = IngestedEvent::from_message(msg.clone(), Utc::now(), &ThreadRandom);
        assert_eq!(ev.name, "subscriber.created");
        assert_eq!(ev.payload, msg);
    }

    #[test]
    fn plain_string_message_gets_default_name() {
        let ev = IngestedEvent::from_message(json!("hello"), Utc::now(), &ThreadRandom);
        assert_eq!(ev.name, DEFAULT_EVENT_NAME);
        assert_eq!(ev.payload, json!("hello"));
    }

    #[test]
    fn webhook_id_is_prefixed_source_id() {
        let ev = IngestedEvent::from_message(json!({}), Utc::now(), &ThreadRandom);
        let id = ev.webhook_id();
        assert!(id.starts_with("WH-"));
        assert_eq!(id.len(), 3 + SOURCE_ID_BYTES * 2);
    }

    #[test]
    fn send_response_shapes() {
        let queued = serde_json::to_value(SendResponse::Queued {
            success: true,
            message: "ok",
            queued_at: "2025-01-01T00:00:00.000Z".into(),
        })
        .unwrap();
        assert_eq!(queued["queuedAt"], "2025-01-01T00:00:00.000Z");
        assert!(queued.get("eventId").is_none());

        let stored = serde_json::to_value(SendResponse::Stored {
            success: true,
            message: "ok",
            event_id: 7,
            webhook_id: "WH-ab".into(),
        })
        .unwrap();
        assert_eq!(stored["eventId"], 7);
        assert_eq!(stored["webhookId"], "WH-ab");
    }
}
