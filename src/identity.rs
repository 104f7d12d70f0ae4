use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::state::AppState;

// Client identity the admission window is keyed on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Keys on the TCP peer. Proxy headers are only read when the gateway
    /// sits behind a proxy that overwrites them (`trust_proxy`), otherwise
    /// any client could pick a fresh identity per request.
    pub fn resolve(parts: &Parts, trust_proxy: bool) -> Self {
        let from_proxy = trust_proxy
            .then(|| from_headers(&parts.headers))
            .flatten();

        let identity = from_proxy
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        ClientIdentity(identity)
    }
}

// first X-Forwarded-For hop, then X-Real-IP
fn from_headers(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded.or_else(real_ip).map(str::to_string)
}

impl FromRequestParts<Arc<AppState>> for ClientIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::resolve(parts, state.trust_proxy))
    }
}
