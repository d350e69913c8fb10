//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use postgres_backup_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (PostgresBackup, SecretKeyRef, etc.)
//! - Reconciler types and backend traits
//! - Storage types
//! - Config types

// CRD types - most commonly used
pub use crate::crd::*;

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    reconcile, BackoffState, BackupRequestApi, KubeCluster, Reconciler, ReconcilerError,
    SecretSource, TriggerSource, WorkloadApi,
};

// Storage - needed for implementing alternative artifact stores
pub use crate::storage::{ArtifactStore, AzureBlobStore, TransferError, UploadReceipt, UploadRequest};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, SharedControllerConfig};
