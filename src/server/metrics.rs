use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::VERSION;

/// Path on which the metrics are served.
pub const METRICS_PATH: &str = "/metrics";

/// Upper bounds, in seconds, of the request duration buckets.
pub const REQUEST_DURATION_BUCKETS: [f64; 4] = [0.1, 0.5, 1.0, 1.5];

/// Request metrics and the version gauge, kept in a registry owned by one server.
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    request_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Counter for total requests received"),
            &["method", "status"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            )
            .buckets(REQUEST_DURATION_BUCKETS.to_vec()),
            &["method", "status"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let version = IntGaugeVec::new(
            Opts::new("http_mock_version", "Server Version"),
            &["version"],
        )?;
        version.with_label_values(&[VERSION]).set(1);
        registry.register(Box::new(version))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            requests,
            request_duration,
        })
    }

    pub fn observe(&self, method: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        let labels = [method, status.as_str()];

        self.requests.with_label_values(&labels).inc();
        self.request_duration
            .with_label_values(&labels)
            .observe(elapsed.as_secs_f64());
    }

    /// Encodes all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}
