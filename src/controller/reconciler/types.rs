//! # Types
//!
//! Core types for the reconciler.

use crate::config::SharedControllerConfig;
use crate::constants::{ERROR_BACKOFF_MAX_MINUTES, ERROR_BACKOFF_MIN_MINUTES};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::cluster::{
    BackupRequestApi, KubeCluster, SecretSource, WorkloadApi,
};
use crate::storage::{ArtifactStore, AzureBlobStore, TransferError};
use anyhow::Result;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Errors ending a backup attempt
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("PostgresBackup '{0}' has no namespace")]
    MissingNamespace(String),

    #[error("failed to load PostgresBackup '{namespace}/{name}': {source}")]
    Load {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("invalid PostgresBackup spec: {0}")]
    Validation(String),

    #[error("secret '{namespace}/{name}' not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("failed to read secret '{namespace}/{name}': {source}")]
    SecretLookup {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("key '{key}' not found in secret '{namespace}/{name}'")]
    KeyNotFound {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("key '{key}' in secret '{namespace}/{name}' is not valid UTF-8")]
    InvalidSecretValue {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("cannot link dump pod to its PostgresBackup: {0}")]
    OwnerReference(String),

    #[error("failed to submit dump pod '{workload}': {source}")]
    WorkloadSubmit {
        workload: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to read dump pod '{workload}': {source}")]
    WorkloadRead {
        workload: String,
        #[source]
        source: kube::Error,
    },

    #[error("dump pod '{workload}' disappeared before reaching a terminal phase")]
    WorkloadVanished { workload: String },

    #[error("dump pod '{workload}' failed: {message}")]
    WorkloadFailure { workload: String, message: String },

    #[error("dump pod '{workload}' did not finish within {}s", timeout.as_secs())]
    Timeout { workload: String, timeout: Duration },

    #[error("wait for dump pod '{workload}' was cancelled")]
    Cancelled { workload: String },

    #[error("artifact upload failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("failed to delete dump pod '{workload}': {source}")]
    Teardown {
        workload: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to update PostgresBackup status: {source}")]
    Status {
        #[source]
        source: kube::Error,
    },
}

impl ReconcilerError {
    /// Stage of the attempt that failed, used as a metric label
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            ReconcilerError::MissingNamespace(_) | ReconcilerError::Load { .. } => "load",
            ReconcilerError::Validation(_) => "validation",
            ReconcilerError::SecretNotFound { .. }
            | ReconcilerError::SecretLookup { .. }
            | ReconcilerError::KeyNotFound { .. }
            | ReconcilerError::InvalidSecretValue { .. } => "credentials",
            ReconcilerError::OwnerReference(_)
            | ReconcilerError::WorkloadSubmit { .. }
            | ReconcilerError::WorkloadRead { .. }
            | ReconcilerError::WorkloadVanished { .. }
            | ReconcilerError::WorkloadFailure { .. }
            | ReconcilerError::Timeout { .. }
            | ReconcilerError::Cancelled { .. } => "workload",
            ReconcilerError::Transfer(_) => "transfer",
            ReconcilerError::Teardown { .. } => "teardown",
            ReconcilerError::Status { .. } => "status",
        }
    }
}

/// Trigger source for reconciliation
/// Tracks why a backup attempt was started for logging and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Resource created or spec edited (generation changed)
    SpecChange,
    /// Manual trigger via `pbctl trigger` annotation
    ManualCli,
    /// Periodic re-trigger (nextBackupTime reached)
    TimerBased,
    /// Retry after a failed attempt
    ErrorBackoff,
}

impl TriggerSource {
    /// Get human-readable string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::SpecChange => "spec-change",
            TriggerSource::ManualCli => "manual-cli",
            TriggerSource::TimerBased => "timer-based",
            TriggerSource::ErrorBackoff => "error-backoff",
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
    /// Earliest time the next attempt may start
    pub retry_at: Option<Instant>,
    /// Generation the failed attempt ran against
    pub failed_generation: Option<i64>,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(ERROR_BACKOFF_MIN_MINUTES, ERROR_BACKOFF_MAX_MINUTES),
            error_count: 0,
            retry_at: None,
            failed_generation: None,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.retry_at = None;
        self.failed_generation = None;
        self.backoff.reset();
    }
}

/// Reconciler context shared by every attempt
#[derive(Clone)]
pub struct Reconciler {
    pub config: SharedControllerConfig,
    pub backups: Arc<dyn BackupRequestApi>,
    pub secrets: Arc<dyn SecretSource>,
    pub workloads: Arc<dyn WorkloadApi>,
    pub store: Arc<dyn ArtifactStore>,
    // Backoff state per resource (identified by namespace/name)
    // Owned by the error_policy() layer
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    // Backup locks per resource (identified by namespace/name)
    // Held from before workload submission until the status update
    pub backup_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    // Fired on controller shutdown; aborts in-flight workload waits
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler backed by the Kubernetes API and Azure Blob Storage
    ///
    /// # Errors
    /// Returns an error if the blob HTTP client cannot be created
    pub fn new(client: Client, config: SharedControllerConfig) -> Result<Self> {
        let cluster = Arc::new(KubeCluster::new(client));
        let backups: Arc<dyn BackupRequestApi> = Arc::<KubeCluster>::clone(&cluster);
        let secrets: Arc<dyn SecretSource> = Arc::<KubeCluster>::clone(&cluster);
        let store = Arc::new(AzureBlobStore::new(&config)?);
        Ok(Self::with_backends(config, backups, secrets, cluster, store))
    }

    /// Create a reconciler over arbitrary backends
    #[must_use]
    pub fn with_backends(
        config: SharedControllerConfig,
        backups: Arc<dyn BackupRequestApi>,
        secrets: Arc<dyn SecretSource>,
        workloads: Arc<dyn WorkloadApi>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            config,
            backups,
            secrets,
            workloads,
            store,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            backup_locks: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Get or create the backup lock for a resource
    /// Only one backup attempt per resource may hold it at a time
    pub fn backup_lock(&self, namespace: &str, name: &str) -> Arc<AsyncMutex<()>> {
        let resource_key = format!("{namespace}/{name}");
        let mut locks = self
            .backup_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks
            .entry(resource_key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the lock and backoff state of a resource that no longer exists
    pub fn forget(&self, namespace: &str, name: &str) {
        let resource_key = format!("{namespace}/{name}");
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(&resource_key);
        }
        let mut locks = self
            .backup_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // A lock still held belongs to a running attempt
        if locks
            .get(&resource_key)
            .is_some_and(|lock| lock.try_lock().is_ok())
        {
            locks.remove(&resource_key);
        }
    }

    /// Forget accumulated error backoff after a successful attempt
    pub fn reset_backoff(&self, namespace: &str, name: &str) {
        let resource_key = format!("{namespace}/{name}");
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(&resource_key) {
                state.reset();
            }
        }
    }

    /// Remaining error backoff for a resource
    ///
    /// Status writes of a failed attempt produce watch events that would
    /// otherwise start the next attempt immediately. A spec edit (new
    /// generation) skips the wait.
    #[must_use]
    pub fn pending_retry(
        &self,
        namespace: &str,
        name: &str,
        generation: Option<i64>,
    ) -> Option<Duration> {
        let resource_key = format!("{namespace}/{name}");
        let states = self.backoff_states.lock().ok()?;
        let state = states.get(&resource_key)?;
        if state.failed_generation != generation {
            return None;
        }
        let remaining = state.retry_at?.checked_duration_since(Instant::now())?;
        (!remaining.is_zero()).then_some(remaining)
    }

    /// Number of consecutive failed attempts recorded for a resource
    #[must_use]
    pub fn error_count(&self, namespace: &str, name: &str) -> u32 {
        let resource_key = format!("{namespace}/{name}");
        self.backoff_states
            .lock()
            .ok()
            .and_then(|states| states.get(&resource_key).map(|s| s.error_count))
            .unwrap_or(0)
    }
}
