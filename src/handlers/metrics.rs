use axum::http::{StatusCode, header::CONTENT_TYPE};
use axum::response::IntoResponse;
use prometheus::{Encoder, TextEncoder};
use tracing::error;

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        [(CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
