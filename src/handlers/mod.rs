//! HTTP surface of the gateway.
//!
//! - `GET /` - HTML form posting to `/api/send`
//! - `POST /customer-webhook` - rate limited echo with injected failures
//! - `POST /api/send` - builds an event and hands it to the configured sink
//! - `GET /health`, `GET /metrics`

mod health;
mod index;
mod metrics;
mod send;
mod webhook;

pub use health::health_handler;
pub use index::index_handler;
pub use metrics::metrics_handler;
pub use send::send_handler;
pub use webhook::webhook_handler;

use axum::{
    Router,
    http::{HeaderMap, header::CONTENT_TYPE},
    routing::{get, post},
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::GatewayError;
use crate::identity::ClientIdentity;
use crate::metrics::ADMISSION_REJECTED;
use crate::rate_limit::AdmissionDecision;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/customer-webhook", post(webhook_handler))
        .route("/api/send", post(send_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Runs the admission check, over-quota requests stop here
fn admit(state: &AppState, identity: &ClientIdentity) -> Result<AdmissionDecision, GatewayError> {
    let decision = state.limiter.check(identity.as_str());
    if !decision.allowed {
        ADMISSION_REJECTED.inc();
        warn!(
            client = identity.as_str(),
            limit = decision.limit,
            reset_at = %decision.reset_at,
            "Rate limit exceeded"
        );
        return Err(GatewayError::AdmissionRejected {
            decision,
            window_secs: state.limiter.window().num_seconds(),
        });
    }
    Ok(decision)
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
}

// Form bodies become a flat object of string fields, anything else is JSON.
// An empty body reads as {}
fn parse_body(headers: &HeaderMap, body: &[u8]) -> Result<Value, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    if is_form(headers) {
        let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(body).map_err(|e| {
            warn!(error = %e, "Rejected request with invalid form body");
            GatewayError::ValidationFailed("Invalid form body".to_string())
        })?;
        // repeated keys keep the last value
        let object = fields
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<_, _>>();
        return Ok(Value::Object(object));
    }

    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Rejected request with invalid JSON body");
        GatewayError::ValidationFailed("Invalid JSON body".to_string())
    })
}
