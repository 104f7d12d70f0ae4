use axum::Json;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use crate::rate_limit::AdmissionDecision;
use crate::sink::SinkError;

/// Per-request failures, converted to a JSON body at the endpoint boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("too many requests")]
    AdmissionRejected {
        decision: AdmissionDecision,
        window_secs: i64,
    },

    #[error("{0}")]
    ValidationFailed(String),

    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("sink error: {0}")]
    SinkFailed(String),

    #[error("simulated downstream failure")]
    SimulatedFailure,
}

impl From<SinkError> for GatewayError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Unavailable(msg) => GatewayError::SinkUnavailable(msg),
            SinkError::Rejected(msg) | SinkError::Failed(msg) => GatewayError::SinkFailed(msg),
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AdmissionRejected { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            GatewayError::SinkUnavailable(_) | GatewayError::SimulatedFailure => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::SinkFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

// draft standard RateLimit-* headers
pub fn rate_limit_headers(decision: &AdmissionDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let reset_in = decision.reset_in_secs(Utc::now());
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset_in));
    headers
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            GatewayError::AdmissionRejected {
                decision,
                window_secs,
            } => {
                let mut headers = rate_limit_headers(&decision);
                headers.insert(
                    axum::http::header::RETRY_AFTER,
                    HeaderValue::from(decision.reset_in_secs(Utc::now())),
                );
                let body = json!({
                    "error": "Too many requests",
                    "message": format!(
                        "You have exceeded the rate limit of {} requests per {} seconds",
                        decision.limit, window_secs
                    ),
                    "retryAfter": decision.retry_after_epoch_secs(),
                });
                (status, headers, Json(body)).into_response()
            }
            GatewayError::ValidationFailed(msg) => (status, Json(json!({ "error": msg }))).into_response(),
            GatewayError::SinkUnavailable(_) => {
                (status, Json(json!({ "error": "Sink not ready" }))).into_response()
            }
            GatewayError::SinkFailed(_) => {
                (status, Json(json!({ "error": "Failed to publish event" }))).into_response()
            }
            GatewayError::SimulatedFailure => {
                (status, Json(json!({ "error": "Fail to process the request" }))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn sink_errors_map_to_statuses() {
        let unavailable: GatewayError = SinkError::Unavailable("x".into()).into();
        let rejected: GatewayError = SinkError::Rejected("x".into()).into();
        let failed: GatewayError = SinkError::Failed("x".into()).into();

        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(rejected.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(GatewayError::SimulatedFailure.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn rejection_carries_retry_hint() {
        let reset_at = Utc::now() + TimeDelta::seconds(10);
        let decision = AdmissionDecision {
            allowed: false,
            limit: 20,
            remaining: 0,
            reset_at,
        };
        let resp = GatewayError::AdmissionRejected {
            decision,
            window_secs: 30,
        }
        .into_response();

        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[&RATELIMIT_LIMIT], "20");
        assert_eq!(resp.headers()[&RATELIMIT_REMAINING], "0");
        assert!(resp.headers().contains_key(axum::http::header::RETRY_AFTER));

        let body = body_json(resp).await;
        assert_eq!(body["error"], "Too many requests");
        assert_eq!(
            body["message"],
            "You have exceeded the rate limit of 20 requests per 30 seconds"
        );
        assert_eq!(body["retryAfter"], decision.retry_after_epoch_secs());
    }

    #[tokio::test]
    async fn validation_error_body() {
        let resp = GatewayError::ValidationFailed("No message".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await, json!({"error": "No message"}));
    }
}
