//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, CSRF denials, rate-limit rejections)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `lendgate_requests_total` (counter): requests by method, path, status
//! - `lendgate_request_duration_seconds` (histogram): latency distribution
//! - `lendgate_csrf_denied_total` (counter): mutating requests that failed the token gate
//! - `lendgate_rate_limited_total` (counter): rejections by limiter tier
//! - `lendgate_error_reports_total` (counter): accepted client error reports
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Denial counters never carry request content, only the tier label

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the global recorder and start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_counter!("lendgate_requests_total", "Total requests by method, path, status");
            describe_histogram!(
                "lendgate_request_duration_seconds",
                "Request latency distribution"
            );
            describe_counter!(
                "lendgate_csrf_denied_total",
                "Mutating requests rejected by the CSRF gate"
            );
            describe_counter!(
                "lendgate_rate_limited_total",
                "Requests rejected by a rate limiter tier"
            );
            describe_counter!(
                "lendgate_error_reports_total",
                "Client error reports accepted"
            );
            tracing::info!(address = %addr, "Metrics endpoint started");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to start metrics endpoint");
        }
    }
}

/// Record a completed request.
pub fn record_request(method: &str, path: &str, status: u16, start: Instant) {
    counter!(
        "lendgate_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("lendgate_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record a CSRF gate denial.
pub fn record_csrf_denied() {
    counter!("lendgate_csrf_denied_total").increment(1);
}

/// Record a rate-limiter rejection for the given tier.
pub fn record_rate_limited(tier: &str) {
    counter!("lendgate_rate_limited_total", "tier" => tier.to_string()).increment(1);
}

/// Record an accepted client error report.
pub fn record_error_report() {
    counter!("lendgate_error_reports_total").increment(1);
}
