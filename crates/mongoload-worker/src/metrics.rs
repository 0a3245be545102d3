//! Prometheus export of result events

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use mongoload_core::{ReportingSink, RequestEvent};

/// Sink recording result events as Prometheus metrics.
#[derive(Clone)]
pub struct PrometheusSink {
    requests: IntCounterVec,
    duration: HistogramVec,
}

impl PrometheusSink {
    /// Create the metrics and register them on `registry`.
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let requests = IntCounterVec::new(
            Opts::new(
                "mongoload_requests_total",
                "Total number of reported workload operations",
            ),
            &["name", "status"],
        )?;

        // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "mongoload_request_duration_seconds",
                "Workload operation duration in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["name"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self { requests, duration })
    }
}

impl ReportingSink for PrometheusSink {
    fn fire(&self, event: RequestEvent) {
        let status = if event.is_success() { "success" } else { "failure" };
        self.requests
            .with_label_values(&[event.name.as_ref(), status])
            .inc();
        self.duration
            .with_label_values(&[event.name.as_ref()])
            .observe(event.response_time_ms as f64 / 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongoload_core::WorkloadError;
    use std::sync::Arc;

    #[test]
    fn test_events_are_counted_by_status() {
        let registry = Registry::new();
        let sink = PrometheusSink::register(&registry).unwrap();

        sink.fire(RequestEvent::success(Arc::from("find"), 12));
        sink.fire(RequestEvent::success(Arc::from("find"), 8));
        sink.fire(RequestEvent::failure(
            Arc::from("find"),
            3,
            Arc::new(WorkloadError::operation("boom")),
        ));

        assert_eq!(
            sink.requests.with_label_values(&["find", "success"]).get(),
            2
        );
        assert_eq!(
            sink.requests.with_label_values(&["find", "failure"]).get(),
            1
        );
        assert_eq!(
            sink.duration.with_label_values(&["find"]).get_sample_count(),
            3
        );
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        PrometheusSink::register(&registry).unwrap();
        assert!(PrometheusSink::register(&registry).is_err());
    }
}
