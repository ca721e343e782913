//! Prometheus metrics for studyhub-server.
//!
//! Exposes server metrics in Prometheus format at the `/metrics` endpoint.

use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return a handle for rendering.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        "studyhub_http_requests_total",
        "Total number of HTTP requests by route and status"
    );
    describe_histogram!(
        "studyhub_http_request_duration_seconds",
        "Duration of HTTP requests in seconds"
    );
    describe_counter!(
        "studyhub_join_decisions_total",
        "Join request decisions by outcome"
    );
    describe_counter!(
        "studyhub_requests_expired_total",
        "Join requests expired by the background sweep"
    );

    Ok(handle)
}

/// A handle that renders without touching the global recorder.
#[cfg(test)]
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

pub fn record_http_request(method: String, route: String, status: u16, duration: Duration) {
    counter!(
        "studyhub_http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "studyhub_http_request_duration_seconds",
        "method" => method,
        "route" => route
    )
    .record(duration.as_secs_f64());
}

/// Record a leader decision; `outcome` is `approve`, `reject` or an error code.
pub fn record_decision(outcome: &'static str) {
    counter!("studyhub_join_decisions_total", "outcome" => outcome).increment(1);
}

pub fn record_sweep(expired: usize) {
    counter!("studyhub_requests_expired_total").increment(expired as u64);
}

/// Route layer timing every matched request.
pub async fn track_http(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(req).await;
    record_http_request(method, route, response.status().as_u16(), start.elapsed());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_http_request(
            "GET".into(),
            "/api/groups".into(),
            200,
            Duration::from_millis(3),
        );
        record_decision("approve");
        record_sweep(2);
    }

    #[test]
    fn test_detached_handle_renders() {
        let handle = detached_handle();
        assert!(!handle.render().contains("studyhub_http_requests_total"));
    }
}
