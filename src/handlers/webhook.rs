use axum::{
    Json, body::Bytes, extract::State, http::HeaderMap, response::IntoResponse,
    response::Response,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::{admit, parse_body};
use crate::error::{GatewayError, rate_limit_headers};
use crate::identity::ClientIdentity;
use crate::metrics::{SIMULATED_FAILURES, WEBHOOK_REQUESTS};
use crate::models::{RateLimitInfo, WebhookEcho, iso_millis};
use crate::state::AppState;

// Mock customer endpoint: rate limited, fails at random, echoes the payload otherwise
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    identity: ClientIdentity,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    WEBHOOK_REQUESTS.inc();

    // an unparseable body is answered 400 without taking a slot in the window
    let data = parse_body(&headers, &body)?;

    // rejected requests never reach the fault injector
    let decision = admit(&state, &identity)?;

    info!(
        client = identity.as_str(),
        remaining = decision.remaining,
        limit = decision.limit,
        "Webhook received"
    );

    if state.fault.should_fail() {
        SIMULATED_FAILURES.inc();
        warn!(client = identity.as_str(), "Injected failure, answering 503");
        return Err(GatewayError::SimulatedFailure);
    }

    let echo = WebhookEcho {
        success: true,
        message: "Data received successfully",
        received_data: data,
        timestamp: iso_millis(Utc::now()),
        rate_limit: RateLimitInfo::from(&decision),
    };

    Ok((rate_limit_headers(&decision), Json(echo)).into_response())
}
