//! # PostgresBackup Status
//!
//! Observed state written by the controller.
//!
//! `last_backup_time` and `backup_status` record the outcome of the last fully
//! successful backup and are never touched by a failed attempt. The remaining
//! fields are bookkeeping for scheduling and for the workload currently in flight.

use serde::{Deserialize, Serialize};

/// Value of `backupStatus` after a successful backup
pub const BACKUP_STATUS_SUCCESS: &str = "Success";

/// Status of the PostgresBackup resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresBackupStatus {
    /// Completion time of the last successful backup (RFC3339)
    #[serde(default)]
    pub last_backup_time: Option<String>,
    /// Outcome marker of the last successful backup ("Success")
    #[serde(default)]
    pub backup_status: Option<String>,
    /// Generation the last successful backup ran against
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// When the next periodic backup is due (RFC3339)
    /// Persisted so the schedule survives controller restarts
    #[serde(default)]
    pub next_backup_time: Option<String>,
    /// Name of the dump pod of the attempt in progress
    /// Set on submission and cleared when the attempt ends. A value seen at the
    /// start of a new attempt belongs to an attempt that never finished.
    #[serde(default)]
    pub active_workload: Option<String>,
    /// Last observed phase of the active (or most recent) dump pod
    #[serde(default)]
    pub workload_phase: Option<String>,
    /// Dump pods whose deletion failed and must be retried
    #[serde(default)]
    pub pending_cleanup: Vec<String>,
    /// Value of the manual trigger annotation that was last honoured
    #[serde(default)]
    pub handled_trigger: Option<String>,
}
