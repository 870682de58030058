//! Prometheus metrics collection for llm-proxy
//!
//! This module provides metrics instrumentation for tracking:
//! - HTTP requests by method, matched route and status
//! - Provider calls by provider, operation and outcome
//! - Rate-limit rejections
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use crate::gateway::{CallOutcome, OutcomeRecorder};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Content type of the text exposition format
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Label used for requests that matched no route
pub const UNMATCHED_PATH: &str = "unmatched";

const HTTP_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
const PROVIDER_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Metrics collector for llm-proxy
///
/// Owns its registry; clones share every collector.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    http_requests_total: IntCounterVec,
    http_request_duration: HistogramVec,
    provider_requests_total: IntCounterVec,
    provider_request_duration: HistogramVec,
    rate_limit_rejections: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // `path` is the route template, never the raw URI
        let http_requests_total = IntCounterVec::new(
            Opts::new(
                "http_requests_total",
                "Total HTTP requests by method, matched route and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(HTTP_BUCKETS.to_vec()),
            &["method", "path", "status"],
        )?;

        let provider_requests_total = IntCounterVec::new(
            Opts::new(
                "provider_requests_total",
                "Total provider calls by provider, operation and outcome",
            ),
            &["provider", "operation", "outcome"],
        )?;

        // Streams observe their full lifetime
        let provider_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "provider_request_duration_seconds",
                "Provider call latency in seconds",
            )
            .buckets(PROVIDER_BUCKETS.to_vec()),
            &["provider", "operation", "outcome"],
        )?;

        let rate_limit_rejections = IntCounter::with_opts(Opts::new(
            "rate_limit_rejections_total",
            "Total requests rejected by the gateway's own rate limiter",
        ))?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(provider_requests_total.clone()))?;
        registry.register(Box::new(provider_request_duration.clone()))?;
        registry.register(Box::new(rate_limit_rejections.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            http_requests_total,
            http_request_duration,
            provider_requests_total,
            provider_request_duration,
            rate_limit_rejections,
        })
    }

    /// Record one finished HTTP request
    pub fn record_http(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        let labels = [method, path, status.as_str()];
        self.http_requests_total.with_label_values(&labels).inc();
        self.http_request_duration
            .with_label_values(&labels)
            .observe(elapsed.as_secs_f64());
    }

    /// Record one provider call
    pub fn record_provider(&self, outcome: &CallOutcome) {
        let labels = [
            outcome.provider.as_str(),
            outcome.operation.as_str(),
            outcome.outcome.as_str(),
        ];
        self.provider_requests_total.with_label_values(&labels).inc();
        self.provider_request_duration
            .with_label_values(&labels)
            .observe(outcome.elapsed.as_secs_f64());
    }

    /// Count a request denied by the rate limiter
    pub fn rate_limit_rejection(&self) {
        self.rate_limit_rejections.inc();
    }

    /// Current rate-limit rejection count
    pub fn rate_limit_rejections_count(&self) -> u64 {
        self.rate_limit_rejections.get()
    }

    /// Encode all metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    metric_family_count = metric_families.len(),
                    "Prometheus text encoder failed"
                );
                e
            })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Prometheus encoder produced invalid UTF-8 at byte {}",
                e.utf8_error().valid_up_to()
            ))
        })
    }
}

impl OutcomeRecorder for Metrics {
    fn record(&self, outcome: &CallOutcome) {
        self.record_provider(outcome);
    }
}
