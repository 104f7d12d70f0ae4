use chrono::Utc;
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::metrics::TRACKED_CLIENTS;
use crate::rate_limit::RateLimiter;

// Eviction worker - drops expired admission windows so idle clients don't pile up
pub async fn eviction_worker(limiter: Arc<RateLimiter>, sweep_interval: Duration) {
    let mut ticker = interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval = ?sweep_interval, "Eviction worker started");

    loop {
        ticker.tick().await;
        sweep(&limiter);
    }
}

pub fn sweep(limiter: &RateLimiter) -> usize {
    let removed = limiter.evict_expired(Utc::now());
    let tracked = limiter.tracked_clients();
    TRACKED_CLIENTS.set(tracked as f64);

    if removed > 0 {
        debug!(removed, tracked, "Evicted expired admission windows");
    }
    removed
}
