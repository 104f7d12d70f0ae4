use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, register_counter, register_counter_vec, register_gauge,
    register_histogram,
};


lazy_static! {
    pub static ref WEBHOOK_REQUESTS: Counter =
        register_counter!("gateway_webhook_requests_total", "Total webhook callbacks received").unwrap();
    pub static ref ADMISSION_REJECTED: Counter =
        register_counter!("gateway_admission_rejected_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref SIMULATED_FAILURES: Counter =
        register_counter!("gateway_simulated_failures_total", "Webhook callbacks answered with an injected 503").unwrap();
    pub static ref EVENTS_PUBLISHED: CounterVec = register_counter_vec!(
        "gateway_events_published_total",
        "Events handed off to a sink",
        &["sink"]
    )
    .unwrap();
    pub static ref SINK_FAILURES: CounterVec = register_counter_vec!(
        "gateway_sink_failures_total",
        "Sink publish failures by kind",
        &["sink", "kind"]
    )
    .unwrap();
    pub static ref SINK_PUBLISH_LATENCY: Histogram = register_histogram!(
        "gateway_sink_publish_seconds",
        "Sink publish latency in seconds"
    )
    .unwrap();
    pub static ref TRACKED_CLIENTS: Gauge =
        register_gauge!("gateway_tracked_clients", "Client identities with a live admission window").unwrap();
}
