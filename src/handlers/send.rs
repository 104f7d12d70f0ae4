use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{admit, parse_body};
use crate::error::GatewayError;
use crate::identity::ClientIdentity;
use crate::metrics::{EVENTS_PUBLISHED, SINK_FAILURES, SINK_PUBLISH_LATENCY};
use crate::models::{IngestedEvent, SendResponse, iso_millis};
use crate::sink::{SinkAck, SinkError};
use crate::state::AppState;

// absent, null, false, 0 and "" all count as no message
fn present(message: &Value) -> bool {
    match message {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn response_for(ack: SinkAck) -> SendResponse {
    match ack {
        SinkAck::Queued { queued_at } => SendResponse::Queued {
            success: true,
            message: "Message sent to queue successfully",
            queued_at: iso_millis(queued_at),
        },
        SinkAck::Stored {
            record_id,
            webhook_id,
        } => SendResponse::Stored {
            success: true,
            message: "Event stored successfully",
            event_id: record_id,
            webhook_id,
        },
    }
}

// Test harness entry point: build an event from `message` and hand it to the sink
pub async fn send_handler(
    State(state): State<Arc<AppState>>,
    identity: ClientIdentity,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SendResponse>, GatewayError> {
    let body = parse_body(&headers, &body)?;
    if state.limit_send {
        admit(&state, &identity)?;
    }

    let Some(message) = body.get("message").filter(|m| present(m)).cloned() else {
        warn!(client = identity.as_str(), "Send rejected: no message");
        return Err(GatewayError::ValidationFailed("No message".to_string()));
    };

    let event = IngestedEvent::from_message(message, Utc::now(), state.random.as_ref());
    let sink = state.sink.name();

    let timer = SINK_PUBLISH_LATENCY.start_timer();
    let result = state.sink.publish(&event).await;
    timer.observe_duration();

    match result {
        Ok(ack) => {
            EVENTS_PUBLISHED.with_label_values(&[sink]).inc();
            info!(sink, event = %event.name, source_id = %event.source_id, "Event handed to sink");
            Ok(Json(response_for(ack)))
        }
        Err(e) => {
            SINK_FAILURES.with_label_values(&[sink, e.kind()]).inc();
            match &e {
                SinkError::Unavailable(_) => warn!(sink, error = %e, "Sink not ready"),
                _ => error!(sink, error = %e, event = %event.name, "Sink publish failed"),
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falsy_messages_are_missing() {
        for v in [json!(null), json!(false), json!(0), json!(""), json!(0.0)] {
            assert!(!present(&v), "{v} should count as missing");
        }
        for v in [json!("hi"), json!(1), json!(true), json!({}), json!([])] {
            assert!(present(&v), "{v} should count as present");
        }
    }
}
