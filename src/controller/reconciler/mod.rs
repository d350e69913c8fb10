//! # Reconciler
//!
//! Core reconciliation logic for `PostgresBackup` resources.
//!
//! The reconciler:
//! - Resolves the database password and storage account key from secrets
//! - Runs `pg_dump` in a short-lived pod owned by the resource
//! - Uploads the dump to Azure Blob Storage
//! - Records the outcome in the resource status and schedules the next run
//!
//! ## Reconciliation Flow
//!
//! 1. Load the resource and validate its spec
//! 2. Decide whether a backup is due (spec change, manual trigger, schedule)
//! 3. Take the per-resource backup lock and sweep leftovers of earlier attempts
//! 4. Resolve credentials, submit the dump pod, wait for a terminal phase
//! 5. Upload the dump, delete the pod
//! 6. Update status, requeue after the backup interval

pub mod cluster;
pub mod lifecycle;
pub mod reconcile;
pub mod schedule;
pub mod secrets;
pub mod status;
pub mod types;
pub mod validation;
pub mod workload;

// Re-export public API
pub use cluster::{BackupRequestApi, KubeCluster, SecretSource, WorkloadApi};
pub use reconcile::reconcile;
pub use types::{BackoffState, Reconciler, ReconcilerError, TriggerSource};
