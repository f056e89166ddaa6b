use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

use crate::config::HttpConfig;
use crate::state::AppState;

const REQUESTS_TOTAL: &str = "http_requests_total";
const REQUEST_DURATION: &str = "http_request_duration_seconds";

/// Process-wide token bucket: `rate_limit_rps` sustained, `rate_limit_burst` peak.
pub fn build_limiter(cfg: &HttpConfig) -> Arc<DefaultDirectRateLimiter> {
    let rps = NonZeroU32::new(cfg.rate_limit_rps).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(cfg.rate_limit_burst).unwrap_or(rps);
    Arc::new(RateLimiter::direct(Quota::per_second(rps).allow_burst(burst)))
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.limiter.check().is_err() {
        warn!(path = %req.uri().path(), "rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
    }
    next.run(req).await
}

/// Counts requests and records latency per method and matched route. Sits
/// outside the rate limiter, so throttled requests are counted too.
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let start = Instant::now();
    let res = next.run(req).await;

    let status = res.status().as_u16().to_string();
    counter!(REQUESTS_TOTAL, "method" => method.clone(), "endpoint" => endpoint.clone(), "status" => status)
        .increment(1);
    histogram!(REQUEST_DURATION, "method" => method, "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64());
    res
}

/// Installs the global Prometheus recorder. Call once per process.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("install prometheus recorder")
}
