//! # Metrics
//!
//! Prometheus metrics for the registration service.
//!
//! ## Metrics Exposed
//!
//! - `gitops_registrations_total{flow,outcome}` - Registrations by flow and outcome
//! - `gitops_registration_duration_seconds{flow}` - Duration of registration workflows
//! - `gitops_rollbacks_total{outcome}` - Compensating namespace deletions
//! - `gitops_cluster_role_warnings_total` - Warnings raised by the ClusterRole analyzer

use anyhow::Result;
use prometheus::{Encoder, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static REGISTRATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitops_registrations_total",
            "Total number of registrations by flow and outcome",
        ),
        &["flow", "outcome"],
    )
    .expect("Failed to create REGISTRATIONS_TOTAL metric - this should never happen")
});

static REGISTRATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "gitops_registration_duration_seconds",
            "Duration of registration workflows in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["flow"],
    )
    .expect("Failed to create REGISTRATION_DURATION metric - this should never happen")
});

static ROLLBACKS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gitops_rollbacks_total",
            "Total number of compensating rollbacks by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create ROLLBACKS_TOTAL metric - this should never happen")
});

static CLUSTER_ROLE_WARNINGS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gitops_cluster_role_warnings_total",
        "Total number of warnings raised while analyzing the impersonation ClusterRole",
    )
    .expect("Failed to create CLUSTER_ROLE_WARNINGS_TOTAL metric - this should never happen")
});

/// Register all metrics; repeated calls are no-ops
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    register(Box::new(REGISTRATIONS_TOTAL.clone()))?;
    register(Box::new(REGISTRATION_DURATION.clone()))?;
    register(Box::new(ROLLBACKS_TOTAL.clone()))?;
    register(Box::new(CLUSTER_ROLE_WARNINGS_TOTAL.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn record_registration(flow: &str, outcome: &str, duration: f64) {
    REGISTRATIONS_TOTAL.with_label_values(&[flow, outcome]).inc();
    REGISTRATION_DURATION
        .with_label_values(&[flow])
        .observe(duration);
}

pub fn increment_rollbacks(outcome: &str) {
    ROLLBACKS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_cluster_role_warnings(count: u64) {
    CLUSTER_ROLE_WARNINGS_TOTAL.inc_by(count);
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
