//! # Custom Resource Definitions
//!
//! CRD types for the Postgres Backup Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `PostgresBackup` specification and the secret key reference type
//! - `status.rs` - Observed state written back by the controller

mod spec;
mod status;

pub use spec::{PostgresBackup, PostgresBackupSpec, SecretKeyRef};
pub use status::{PostgresBackupStatus, BACKUP_STATUS_SUCCESS};
