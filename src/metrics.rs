/// Prometheus metrics for the events API
///
/// Counters and histograms are registered once in the global [`METRICS`]
/// collector and exposed in text format on `/metrics`.
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics registry instance
pub static METRICS: Lazy<Arc<MetricsCollector>> = Lazy::new(|| Arc::new(MetricsCollector::new()));

/// Labels for event operation outcomes
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    /// Operation name (e.g., "list_visible", "create")
    pub operation: String,
    /// Envelope outcome ("success", "error")
    pub status: String,
}

/// Labels for failed operations
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub operation: String,
    /// Error category (e.g., "store_error", "client_error")
    pub category: String,
}

/// Labels for per-operation metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    pub operation: String,
}

/// Central metrics collector with Prometheus registry
pub struct MetricsCollector {
    registry: RwLock<Registry>,

    /// Total event requests by operation and envelope status
    pub events_requests_total: Family<RequestLabels, Counter>,

    /// Request duration in seconds by operation
    pub events_request_duration_seconds: Family<OperationLabels, Histogram>,

    /// Requests currently being handled by operation
    pub events_active_requests: Family<OperationLabels, Gauge>,

    /// Mutating requests rejected for an unknown actor
    pub events_authorization_failures_total: Family<OperationLabels, Counter>,

    /// Failed operations by error category
    pub events_errors_total: Family<ErrorLabels, Counter>,

    /// Connections opened to the document store
    pub store_connections_opened_total: Counter,
}

impl MetricsCollector {
    /// Create a new metrics collector with all metrics registered
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let events_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "events_requests",
            "Total number of event requests",
            events_requests_total.clone(),
        );

        let events_request_duration_seconds =
            Family::<OperationLabels, Histogram>::new_with_constructor(|| {
                // 1ms .. ~4s
                Histogram::new(exponential_buckets(0.001, 2.5, 10))
            });
        registry.register(
            "events_request_duration_seconds",
            "Event request latency histogram in seconds",
            events_request_duration_seconds.clone(),
        );

        let events_active_requests = Family::<OperationLabels, Gauge>::default();
        registry.register(
            "events_active_requests",
            "Number of event requests currently being processed",
            events_active_requests.clone(),
        );

        let events_authorization_failures_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "events_authorization_failures",
            "Mutating requests rejected because the actor is unknown",
            events_authorization_failures_total.clone(),
        );

        let events_errors_total = Family::<ErrorLabels, Counter>::default();
        registry.register(
            "events_errors",
            "Failed event operations by error category",
            events_errors_total.clone(),
        );

        let store_connections_opened_total = Counter::default();
        registry.register(
            "events_store_connections_opened",
            "Connections opened to the document store",
            store_connections_opened_total.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            events_requests_total,
            events_request_duration_seconds,
            events_active_requests,
            events_authorization_failures_total,
            events_errors_total,
            store_connections_opened_total,
        }
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        let registry = self.registry.read();
        encode(&mut buffer, &registry)?;
        Ok(buffer)
    }

    pub fn record_request(&self, operation: &str, status: &str, duration: Duration) {
        self.events_requests_total
            .get_or_create(&RequestLabels {
                operation: operation.to_string(),
                status: status.to_string(),
            })
            .inc();

        self.events_request_duration_seconds
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
            })
            .observe(duration.as_secs_f64());
    }

    pub fn record_authorization_failure(&self, operation: &str) {
        self.events_authorization_failures_total
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
            })
            .inc();
    }

    pub fn record_error(&self, operation: &str, category: &str) {
        self.events_errors_total
            .get_or_create(&ErrorLabels {
                operation: operation.to_string(),
                category: category.to_string(),
            })
            .inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for request timing
///
/// Increments the active gauge on creation. Call [`RequestMetrics::finish`]
/// with the envelope outcome; a guard dropped unfinished counts as an error.
pub struct RequestMetrics {
    operation: &'static str,
    start: Instant,
    completed: bool,
}

impl RequestMetrics {
    pub fn new(operation: &'static str) -> Self {
        METRICS
            .events_active_requests
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
            })
            .inc();

        Self {
            operation,
            start: Instant::now(),
            completed: false,
        }
    }

    pub fn finish(mut self, success: bool) {
        self.complete(if success { "success" } else { "error" });
    }

    fn complete(&mut self, status: &str) {
        METRICS.record_request(self.operation, status, self.start.elapsed());
        self.completed = true;

        METRICS
            .events_active_requests
            .get_or_create(&OperationLabels {
                operation: self.operation.to_string(),
            })
            .dec();
    }
}

impl Drop for RequestMetrics {
    fn drop(&mut self) {
        if !self.completed {
            self.complete("error");
        }
    }
}
