//! Prometheus metrics middleware and business counters.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::services::TickSummary;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Records `http_requests_total` and `http_request_duration_seconds`.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = method_to_str(req.method());
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(
        "http_requests_total",
        "method" => method,
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(duration);

    response
}

fn method_to_str(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::PATCH => "PATCH",
        Method::HEAD => "HEAD",
        Method::OPTIONS => "OPTIONS",
        _ => "OTHER",
    }
}

/// Counts passes created, labelled by pass type.
pub fn record_passes_created(pass_type: &'static str, count: usize) {
    if count > 0 {
        counter!("passes_created_total", "type" => pass_type).increment(count as u64);
    }
}

/// Counts passes cancelled, labelled by what cancelled them.
pub fn record_passes_cancelled(cause: &'static str, count: u64) {
    if count > 0 {
        counter!("passes_cancelled_total", "cause" => cause).increment(count);
    }
}

/// Records the outcome of one delivery tick.
pub fn record_delivery_tick(summary: &TickSummary) {
    let bucket = summary.bucket.clone();
    counter!("pass_delivery_ticks_total", "bucket" => bucket.clone(), "result" => "ok")
        .increment(1);
    counter!("passes_delivered_total", "bucket" => bucket.clone())
        .increment(summary.passes_delivered);
    gauge!("pass_delivery_last_email_sent", "bucket" => bucket.clone())
        .set(if summary.outcome.email_sent { 1.0 } else { 0.0 });
    gauge!("pass_delivery_last_telegram_sent", "bucket" => bucket)
        .set(if summary.outcome.telegram_sent { 1.0 } else { 0.0 });
}

/// Counts a tick aborted by a store failure.
pub fn record_delivery_failure(bucket: &str) {
    counter!(
        "pass_delivery_ticks_total",
        "bucket" => bucket.to_string(),
        "result" => "error"
    )
    .increment(1);
}

/// Handler for `/metrics` in Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Installs the global Prometheus recorder.
///
/// Must run once at startup, before any metric is recorded. A second call
/// keeps the first handle.
pub fn init_metrics() -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 30.0, 180.0])?
        .install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle);
    Ok(())
}
