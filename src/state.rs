use std::sync::Arc;

use crate::fault::FaultInjector;
use crate::random::RandomSource;
use crate::rate_limit::RateLimiter;
use crate::sink::EventSink;

// app's shared state, owned by the router and injected into every handler
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub fault: FaultInjector,
    pub sink: Arc<dyn EventSink>,
    pub random: Arc<dyn RandomSource>, // source of event ids
    pub limit_send: bool,              // also rate limit /api/send
    pub trust_proxy: bool,             // key on proxy headers instead of the peer
}
