use crate::RequestFailure;
use metrics::{register_counter, register_histogram, Counter, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::info;

/// Counters for outbound request activity.
///
/// Handles are noop until [`Metrics::registered`] binds them to the global
/// recorder, so library users pay nothing unless they install an exporter.
pub struct Metrics {
    pub requests_succeeded: Counter,
    pub requests_failed: Counter,
    pub request_duration: Histogram,
    pub timeout_errors: Counter,
    pub status_errors: Counter,
    pub transport_errors: Counter,
    pub decode_errors: Counter,
    pub green_checks: Counter,
    pub calculations: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_succeeded: Counter::noop(),
            requests_failed: Counter::noop(),
            request_duration: Histogram::noop(),
            timeout_errors: Counter::noop(),
            status_errors: Counter::noop(),
            transport_errors: Counter::noop(),
            decode_errors: Counter::noop(),
            green_checks: Counter::noop(),
            calculations: Counter::noop(),
        }
    }

    /// Handles registered with whatever recorder is globally installed.
    pub fn registered() -> Self {
        Self {
            requests_succeeded: register_counter!("carbon_requests_succeeded_total"),
            requests_failed: register_counter!("carbon_requests_failed_total"),
            request_duration: register_histogram!("carbon_request_duration_seconds"),
            timeout_errors: register_counter!("carbon_request_timeouts_total"),
            status_errors: register_counter!("carbon_request_status_errors_total"),
            transport_errors: register_counter!("carbon_request_transport_errors_total"),
            decode_errors: register_counter!("carbon_request_decode_errors_total"),
            green_checks: register_counter!("carbon_green_checks_total"),
            calculations: register_counter!("carbon_calculations_total"),
        }
    }

    pub fn record_success(&self) {
        self.requests_succeeded.increment(1);
    }

    pub fn record_failure(&self, failure: &RequestFailure) {
        self.requests_failed.increment(1);

        match failure {
            RequestFailure::Timeout(_) => self.timeout_errors.increment(1),
            RequestFailure::Status { .. } => self.status_errors.increment(1),
            RequestFailure::Transport(_) => self.transport_errors.increment(1),
            RequestFailure::Decode(_) => self.decode_errors.increment(1),
            RequestFailure::Aborted(_) => {}
        }
    }

    pub fn record_request_duration(&self, duration: Duration) {
        self.request_duration.record(duration.as_secs_f64());
    }

    pub fn record_green_check(&self) {
        self.green_checks.increment(1);
    }

    pub fn record_calculation(&self) {
        self.calculations.increment(1);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    /// Install the Prometheus recorder globally. Only one recorder may be
    /// installed per process.
    pub fn install() -> Result<Self, Box<dyn std::error::Error>> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics recorder installed");
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}
