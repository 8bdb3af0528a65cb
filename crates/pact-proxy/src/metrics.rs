//! Prometheus metrics for pact-proxy.
//!
//! Tracks interception outcomes, constraint violations, response rewriting
//! and waits.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use tracing::warn;

lazy_static! {
    /// Intercepted requests by outcome
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "pact_proxy_requests_total",
        "Total number of intercepted requests",
        &["method", "outcome"]  // outcome: matched|no_interaction|constraints_failed|forward_error|bad_request
    )
    .unwrap();

    /// Constraint violations per interaction
    pub static ref CONSTRAINT_VIOLATIONS_TOTAL: CounterVec = register_counter_vec!(
        "pact_proxy_constraint_violations_total",
        "Total number of constraint violations",
        &["interaction"]
    )
    .unwrap();

    /// Response modifiers applied
    pub static ref MODIFIERS_APPLIED_TOTAL: CounterVec = register_counter_vec!(
        "pact_proxy_modifiers_applied_total",
        "Total number of responses rewritten by modifiers",
        &["kind"]  // kind: status|body
    )
    .unwrap();

    /// Wait requests by result
    pub static ref WAIT_TOTAL: CounterVec = register_counter_vec!(
        "pact_proxy_wait_total",
        "Total number of wait-for-interaction requests",
        &["result"]  // result: ok|timeout
    )
    .unwrap();

    /// Forwarding duration
    pub static ref FORWARD_DURATION_MS: HistogramVec = register_histogram_vec!(
        "pact_proxy_forward_duration_ms",
        "Duration of requests forwarded to the target in milliseconds",
        &["method"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request(method: &str, outcome: &str) {
    REQUESTS_TOTAL.with_label_values(&[method, outcome]).inc();
}

pub fn record_constraint_violations(interaction: &str, count: usize) {
    CONSTRAINT_VIOLATIONS_TOTAL
        .with_label_values(&[interaction])
        .inc_by(count as f64);
}

pub fn record_modifier(kind: &str) {
    MODIFIERS_APPLIED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_wait(satisfied: bool) {
    let result = if satisfied { "ok" } else { "timeout" };
    WAIT_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_forward_duration(method: &str, duration_ms: f64) {
    FORWARD_DURATION_MS
        .with_label_values(&[method])
        .observe(duration_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_request("GET", "matched");
        record_constraint_violations("create user", 2);
        record_modifier("status");
        record_wait(false);
        record_forward_duration("GET", 12.5);

        let output = collect_metrics();
        assert!(output.contains("pact_proxy_requests_total"));
        assert!(output.contains("pact_proxy_constraint_violations_total"));
        assert!(output.contains("pact_proxy_modifiers_applied_total"));
        assert!(output.contains("pact_proxy_wait_total"));
        assert!(output.contains("pact_proxy_forward_duration_ms"));
    }
}
