//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Field manager / managed-by value used for patches and labels
pub const CONTROLLER_NAME: &str = "postgres-backup-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default interval between successful backups (24 hours)
pub const DEFAULT_BACKUP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Default interval between workload phase polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default upper bound on how long a dump pod may run (6 hours)
/// Zero disables the deadline
pub const DEFAULT_WORKLOAD_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// Consecutive transient read failures tolerated while polling
pub const DEFAULT_POLL_RETRY_MAX_ATTEMPTS: u32 = 5;

/// First delay after a transient read failure while polling (milliseconds)
pub const DEFAULT_POLL_RETRY_START_MS: u64 = 500;

/// Maximum delay between transient read retries while polling (milliseconds)
pub const DEFAULT_POLL_RETRY_MAX_MS: u64 = 30_000;

/// Requeue delay when an attempt for the same resource is already running
pub const DEFAULT_BUSY_REQUEUE_SECS: u64 = 30;

/// Default dump tool image
pub const DEFAULT_DUMP_IMAGE: &str = "postgres:latest";

/// Directory holding dump files, keyed by resource name
pub const DEFAULT_ARTIFACT_DIR: &str = "/tmp";

/// Blob block size (4 MiB)
pub const DEFAULT_UPLOAD_BLOCK_SIZE_BYTES: usize = 4 * 1024 * 1024;

/// Concurrent block uploads
pub const DEFAULT_UPLOAD_PARALLELISM: usize = 16;

/// Default exponential backoff starting value for watch restarts (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch restarts (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Error requeue backoff bounds (minutes), Fibonacci sequence between them
pub const ERROR_BACKOFF_MIN_MINUTES: u64 = 1;
pub const ERROR_BACKOFF_MAX_MINUTES: u64 = 10;

/// Annotation requesting an immediate backup (value: any token, usually RFC3339)
pub const BACKUP_NOW_ANNOTATION: &str = "database.muntashirislam.com/backup-now";

/// Label carrying the owning PostgresBackup name on dump pods
pub const BACKUP_NAME_LABEL: &str = "database.muntashirislam.com/backup";

/// Standard managed-by label
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Container name inside the dump pod
pub const DUMP_CONTAINER_NAME: &str = "pg-dump";

/// Environment variable carrying the database password into pg_dump
pub const PGPASSWORD_ENV: &str = "PGPASSWORD";

/// Azure Blob Storage REST API version used for Shared Key requests
pub const AZURE_STORAGE_API_VERSION: &str = "2021-08-06";
