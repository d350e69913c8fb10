//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `postgres_backup_reconciliations_total` - Total number of reconciliations
//! - `postgres_backup_reconciliation_errors_total` - Total number of reconciliation errors
//! - `postgres_backup_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `postgres_backup_backups_succeeded_total` - Backups that reached the status update
//! - `postgres_backup_backups_failed_total` - Failed backup attempts by stage
//! - `postgres_backup_workload_duration_seconds` - Time from pod submission to terminal phase
//! - `postgres_backup_upload_bytes_total` - Bytes uploaded to blob storage
//! - `postgres_backup_upload_duration_seconds` - Duration of artifact uploads
//! - `postgres_backup_upload_errors_total` - Upload failures by kind
//! - `postgres_backup_teardown_failures_total` - Dump pods that could not be deleted
//! - `postgres_backup_poll_retries_total` - Transient errors absorbed while polling pods
//! - `postgres_backup_requeues_total` - Requeues by reason

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::{LazyLock, OnceLock};

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "postgres_backup_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "postgres_backup_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "postgres_backup_reconciliation_duration_seconds",
            "Duration of reconciliation operations in seconds",
        )
        .buckets(vec![0.1, 1.0, 10.0, 60.0, 300.0, 900.0, 3600.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static BACKUPS_SUCCEEDED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "postgres_backup_backups_succeeded_total",
        "Total number of successful backups",
    )
    .expect("Failed to create BACKUPS_SUCCEEDED_TOTAL metric - this should never happen")
});

static BACKUPS_FAILED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "postgres_backup_backups_failed_total",
            "Total number of failed backup attempts by failing stage",
        ),
        &["stage"],
    )
    .expect("Failed to create BACKUPS_FAILED_TOTAL metric - this should never happen")
});

static WORKLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "postgres_backup_workload_duration_seconds",
            "Time from dump pod submission to a terminal phase in seconds",
        )
        .buckets(vec![5.0, 30.0, 60.0, 300.0, 900.0, 3600.0, 21600.0]),
    )
    .expect("Failed to create WORKLOAD_DURATION metric - this should never happen")
});

static UPLOAD_BYTES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "postgres_backup_upload_bytes_total",
        "Total number of bytes uploaded to blob storage",
    )
    .expect("Failed to create UPLOAD_BYTES_TOTAL metric - this should never happen")
});

static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "postgres_backup_upload_duration_seconds",
            "Duration of artifact uploads in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
    )
    .expect("Failed to create UPLOAD_DURATION metric - this should never happen")
});

static UPLOAD_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "postgres_backup_upload_errors_total",
            "Total number of upload failures by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create UPLOAD_ERRORS_TOTAL metric - this should never happen")
});

static TEARDOWN_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "postgres_backup_teardown_failures_total",
        "Total number of dump pods that could not be deleted",
    )
    .expect("Failed to create TEARDOWN_FAILURES_TOTAL metric - this should never happen")
});

static POLL_RETRIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "postgres_backup_poll_retries_total",
        "Total number of transient errors retried while polling dump pods",
    )
    .expect("Failed to create POLL_RETRIES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "postgres_backup_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

/// Register every metric with [`REGISTRY`]
///
/// Safe to call more than once; only the first call registers.
///
/// # Errors
/// Returns the error of the first registration if it failed
pub fn register_metrics() -> Result<()> {
    REGISTERED
        .get_or_init(|| register_all().map_err(|e| e.to_string()))
        .clone()
        .map_err(anyhow::Error::msg)
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(BACKUPS_SUCCEEDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BACKUPS_FAILED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKLOAD_DURATION.clone()))?;
    REGISTRY.register(Box::new(UPLOAD_BYTES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPLOAD_DURATION.clone()))?;
    REGISTRY.register(Box::new(UPLOAD_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TEARDOWN_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_RETRIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_backups_succeeded() {
    BACKUPS_SUCCEEDED_TOTAL.inc();
}

/// Count a failed attempt under the stage that failed
pub fn increment_backups_failed(stage: &str) {
    BACKUPS_FAILED_TOTAL.with_label_values(&[stage]).inc();
}

pub fn observe_workload_duration(duration: f64) {
    WORKLOAD_DURATION.observe(duration);
}

/// Record a finished upload
pub fn observe_upload(bytes: u64, duration: f64) {
    UPLOAD_BYTES_TOTAL.inc_by(bytes);
    UPLOAD_DURATION.observe(duration);
}

pub fn increment_upload_errors(kind: &str) {
    UPLOAD_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_teardown_failures() {
    TEARDOWN_FAILURES_TOTAL.inc();
}

pub fn increment_poll_retries() {
    POLL_RETRIES_TOTAL.inc();
}

/// Count a requeue
/// Reasons: schedule, busy, error-backoff
pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}
