use crate::api::AppState;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use ipnetwork::IpNetwork;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_governor::GovernorError;
use tower_governor::key_extractor::KeyExtractor;

/// Keys rate limits by client address. `X-Forwarded-For` is honoured only when the
/// peer is one of our own proxies, and then the right-most untrusted hop wins.
#[derive(Clone, Debug)]
pub struct ClientIpExtractor {
    trusted_proxies: Arc<[IpNetwork]>,
}

impl ClientIpExtractor {
    #[must_use]
    pub fn new(trusted_proxies: &[IpNetwork]) -> Self {
        Self { trusted_proxies: trusted_proxies.into() }
    }

    #[must_use]
    pub fn client_ip(&self, headers: &HeaderMap, peer: IpAddr) -> IpAddr {
        if !self.is_trusted(peer) {
            return peer;
        }

        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|chain| {
                chain.rsplit(',').filter_map(|hop| hop.trim().parse::<IpAddr>().ok()).find(|ip| !self.is_trusted(*ip))
            })
            .unwrap_or(peer)
    }

    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(ip))
    }
}

impl KeyExtractor for ClientIpExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(self.client_ip(req.headers(), peer))
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitMetrics {
    decisions_total: Counter<u64>,
}

impl RateLimitMetrics {
    #[must_use]
    pub fn new() -> Self {
        let meter = global::meter("ephemera-server");
        Self {
            decisions_total: meter
                .u64_counter("ephemera_rate_limit_decisions_total")
                .with_description("Rate limit decisions (allowed/throttled)")
                .build(),
        }
    }

    pub fn record(&self, status: StatusCode) {
        let label = if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Rate limit exceeded");
            "throttled"
        } else {
            "allowed"
        };
        self.decisions_total.add(1, &[KeyValue::new("status", label)]);
    }
}

impl Default for RateLimitMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts every decision the governor layer makes on the way back out.
pub async fn log_rate_limit_events(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let response = next.run(req).await;
    state.rate_limit_metrics.record(response.status());
    response
}
