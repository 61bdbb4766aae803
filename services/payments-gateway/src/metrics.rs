//! Prometheus metrics exposition
//!
//! - `gateway_requests_total` (counter): labels `route`, `method`, `status`
//! - `gateway_request_duration_seconds` (histogram): label `route`
//! - `webhook_verifications_total` (counter): label `result`
//!
//! `token_refresh_total{outcome}` is emitted by the credential provider and
//! rendered through the same recorder.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed request against its route template.
pub fn record_request(route: &str, method: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(duration_secs);
}

/// Record a webhook verification outcome (`accepted` or the rejection label).
pub fn record_webhook(result: &str) {
    metrics::counter!("webhook_verifications_total", "result" => result.to_string())
        .increment(1);
}

/// Middleware recording every routed request. Installed with `route_layer`
/// so the matched route template is available.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = request.method().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    record_request(
        &route,
        &method,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
