//! # Status
//!
//! Merge patches for the PostgresBackup status subresource.
//!
//! Only [`success_patch`] touches `lastBackupTime` and `backupStatus`. The other
//! patches maintain the active-workload marker and the cleanup queue, which are
//! written whatever the outcome of the attempt.

use crate::crd::{PostgresBackup, BACKUP_STATUS_SUCCESS};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Phase recorded when an attempt ended without a terminal pod phase
pub const PHASE_UNKNOWN: &str = "Unknown";

/// Mark a freshly submitted dump pod as the active workload
#[must_use]
pub fn active_patch(workload: &str, phase: &str) -> Value {
    json!({
        "activeWorkload": workload,
        "workloadPhase": phase,
    })
}

/// Clear the active workload after a failed attempt
///
/// `lastBackupTime` and `backupStatus` are left untouched.
#[must_use]
pub fn attempt_end_patch(phase: Option<&str>, pending_cleanup: &[String]) -> Value {
    json!({
        "activeWorkload": Value::Null,
        "workloadPhase": phase.unwrap_or(PHASE_UNKNOWN),
        "pendingCleanup": pending_cleanup,
    })
}

/// Record the result of sweeping leftovers of earlier attempts
#[must_use]
pub fn sweep_patch(pending_cleanup: &[String]) -> Value {
    json!({
        "activeWorkload": Value::Null,
        "pendingCleanup": pending_cleanup,
    })
}

/// Status of a fully successful backup
///
/// Records the completion time, the generation it ran against, and when the
/// next periodic backup is due. `handled_trigger` marks a manual trigger as
/// consumed.
#[must_use]
pub fn success_patch(
    backup: &PostgresBackup,
    completed_at: DateTime<Utc>,
    next_backup_at: DateTime<Utc>,
    pending_cleanup: &[String],
    handled_trigger: Option<&str>,
) -> Value {
    let mut status = Map::new();
    status.insert(
        "lastBackupTime".to_string(),
        json!(completed_at.to_rfc3339()),
    );
    status.insert("backupStatus".to_string(), json!(BACKUP_STATUS_SUCCESS));
    status.insert(
        "observedGeneration".to_string(),
        json!(backup.metadata.generation),
    );
    status.insert(
        "nextBackupTime".to_string(),
        json!(next_backup_at.to_rfc3339()),
    );
    status.insert("activeWorkload".to_string(), Value::Null);
    status.insert("workloadPhase".to_string(), json!("Succeeded"));
    status.insert("pendingCleanup".to_string(), json!(pending_cleanup));
    if let Some(trigger) = handled_trigger {
        status.insert("handledTrigger".to_string(), json!(trigger));
    }
    Value::Object(status)
}
