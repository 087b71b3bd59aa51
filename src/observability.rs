//! Prometheus metrics for the gateway.
//!
//! Metrics live in a private [`Registry`] so several gateways (e.g. in tests)
//! can coexist in one process.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Outcome label for `executron_requests_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Execution completed; in-band errors included.
    Ok,
    /// Rejected by request validation.
    Rejected,
    /// Infrastructure failure surfaced as a server error.
    Failed,
}

impl RequestOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Ok => "ok",
            RequestOutcome::Rejected => "rejected",
            RequestOutcome::Failed => "failed",
        }
    }
}

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    selections: IntCounterVec,
    cleanup_failures: IntCounterVec,
    execution_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("executron_requests_total", "Execution requests by outcome"),
            &["language", "outcome"],
        )?;
        let selections = IntCounterVec::new(
            Opts::new(
                "executron_sandbox_selections_total",
                "Requests routed to each sandbox instance",
            ),
            &["sandbox"],
        )?;
        let cleanup_failures = IntCounterVec::new(
            Opts::new(
                "executron_cleanup_failures_total",
                "Failed removals of per-request sandbox resources",
            ),
            &["resource"],
        )?;
        let execution_duration = HistogramVec::new(
            HistogramOpts::new(
                "executron_execution_duration_seconds",
                "Wall time spent in the sandbox per request",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["path"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(selections.clone()))?;
        registry.register(Box::new(cleanup_failures.clone()))?;
        registry.register(Box::new(execution_duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            selections,
            cleanup_failures,
            execution_duration,
        })
    }

    pub fn record_request(&self, language: &str, outcome: RequestOutcome) {
        self.requests
            .with_label_values(&[language, outcome.as_str()])
            .inc();
    }

    pub fn record_selection(&self, sandbox: &str) {
        self.selections.with_label_values(&[sandbox]).inc();
    }

    /// `resource` is `"script"` or `"context"`.
    pub fn record_cleanup_failure(&self, resource: &str) {
        self.cleanup_failures.with_label_values(&[resource]).inc();
    }

    pub fn observe_execution(&self, path: &str, elapsed: Duration) {
        self.execution_duration
            .with_label_values(&[path])
            .observe(elapsed.as_secs_f64());
    }

    pub fn requests(&self, language: &str, outcome: RequestOutcome) -> u64 {
        self.requests
            .with_label_values(&[language, outcome.as_str()])
            .get()
    }

    pub fn selections(&self, sandbox: &str) -> u64 {
        self.selections.with_label_values(&[sandbox]).get()
    }

    pub fn cleanup_failures(&self, resource: &str) -> u64 {
        self.cleanup_failures.with_label_values(&[resource]).get()
    }

    /// Text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {e}");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
