use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the idempotency gate.
#[derive(Debug, Clone)]
pub struct Metrics {
    initialized: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self { initialized: true }
    }

    pub fn record_gate_decision(&self, decision: &str) {
        counter!("idempotency_gate_decisions_total", "decision" => decision.to_string())
            .increment(1);
    }

    pub fn record_response_cached(&self) {
        counter!("idempotency_responses_cached_total").increment(1);
    }

    pub fn record_filter_failure(&self, phase: &str) {
        counter!("idempotency_filter_failures_total", "phase" => phase.to_string()).increment(1);
    }

    pub fn record_store_operation(&self, operation: &str, duration_ms: f64, success: bool) {
        counter!("record_store_operations_total", "operation" => operation.to_string(), "success" => success.to_string()).increment(1);
        histogram!("record_store_operation_duration_ms", "operation" => operation.to_string())
            .record(duration_ms);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: f64) {
        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string()).increment(1);
        histogram!("http_request_duration_ms", "method" => method.to_string(), "path" => path.to_string()).record(duration_ms);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!(
        "idempotency_gate_decisions_total",
        Unit::Count,
        "Gate entry decisions by kind (proceed, replay, conflict)"
    );
    describe_counter!(
        "idempotency_responses_cached_total",
        Unit::Count,
        "Responses persisted for replay"
    );
    describe_counter!(
        "idempotency_filter_failures_total",
        Unit::Count,
        "Requests rejected because the gate could not consult the store"
    );

    describe_counter!(
        "record_store_operations_total",
        Unit::Count,
        "Total record store operations"
    );
    describe_histogram!(
        "record_store_operation_duration_ms",
        Unit::Milliseconds,
        "Record store operation latency in milliseconds"
    );

    describe_counter!("http_requests_total", Unit::Count, "Total HTTP requests");
    describe_histogram!(
        "http_request_duration_ms",
        Unit::Milliseconds,
        "HTTP request latency in milliseconds"
    );
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
