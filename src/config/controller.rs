//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Configuration shared between the watch loop and the reconciler
pub type SharedControllerConfig = Arc<ControllerConfig>;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Delay between successful backups (seconds)
    pub backup_interval_secs: u64,
    /// Interval between dump pod phase polls (seconds)
    pub poll_interval_secs: u64,
    /// Deadline for a dump pod to reach a terminal phase (seconds)
    /// 0 waits forever
    pub workload_timeout_secs: u64,
    /// Consecutive transient read failures tolerated while polling
    pub poll_retry_max_attempts: u32,
    /// First transient-retry delay while polling (milliseconds)
    pub poll_retry_start_ms: u64,
    /// Cap on transient-retry delay while polling (milliseconds)
    pub poll_retry_max_ms: u64,
    /// Requeue delay when the resource already has an attempt in flight (seconds)
    pub busy_requeue_secs: u64,
    /// Image running pg_dump
    pub dump_image: String,
    /// Directory the dump is written to and uploaded from
    pub artifact_dir: String,
    /// PersistentVolumeClaim mounted at `artifact_dir` in the dump pod
    /// Lets the controller read the file the pod produced
    pub artifact_volume_claim: Option<String>,
    /// Blob block size for chunked uploads (bytes)
    pub upload_block_size_bytes: usize,
    /// Concurrent block uploads
    pub upload_parallelism: usize,
    /// Overrides `https://{account}.blob.core.windows.net` (e.g. Azurite)
    pub blob_endpoint: Option<String>,
    /// Exponential backoff starting value for watch restarts (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value for watch restarts (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// Restrict the watch to one namespace (all namespaces when unset)
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            backup_interval_secs: DEFAULT_BACKUP_INTERVAL_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            workload_timeout_secs: DEFAULT_WORKLOAD_TIMEOUT_SECS,
            poll_retry_max_attempts: DEFAULT_POLL_RETRY_MAX_ATTEMPTS,
            poll_retry_start_ms: DEFAULT_POLL_RETRY_START_MS,
            poll_retry_max_ms: DEFAULT_POLL_RETRY_MAX_MS,
            busy_requeue_secs: DEFAULT_BUSY_REQUEUE_SECS,
            dump_image: DEFAULT_DUMP_IMAGE.to_string(),
            artifact_dir: DEFAULT_ARTIFACT_DIR.to_string(),
            artifact_volume_claim: None,
            upload_block_size_bytes: DEFAULT_UPLOAD_BLOCK_SIZE_BYTES,
            upload_parallelism: DEFAULT_UPLOAD_PARALLELISM,
            blob_endpoint: None,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unparseable values, and zero where a positive value is required, fall
    /// back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            backup_interval_secs: positive_var(
                &lookup,
                "BACKUP_INTERVAL_SECS",
                defaults.backup_interval_secs,
            ),
            poll_interval_secs: positive_var(
                &lookup,
                "POLL_INTERVAL_SECS",
                defaults.poll_interval_secs,
            ),
            workload_timeout_secs: parse_var(
                &lookup,
                "WORKLOAD_TIMEOUT_SECS",
                defaults.workload_timeout_secs,
            ),
            poll_retry_max_attempts: parse_var(
                &lookup,
                "POLL_RETRY_MAX_ATTEMPTS",
                defaults.poll_retry_max_attempts,
            ),
            poll_retry_start_ms: positive_var(
                &lookup,
                "POLL_RETRY_START_MS",
                defaults.poll_retry_start_ms,
            ),
            poll_retry_max_ms: positive_var(
                &lookup,
                "POLL_RETRY_MAX_MS",
                defaults.poll_retry_max_ms,
            ),
            busy_requeue_secs: positive_var(
                &lookup,
                "BUSY_REQUEUE_SECS",
                defaults.busy_requeue_secs,
            ),
            dump_image: non_empty("DUMP_IMAGE").unwrap_or(defaults.dump_image),
            artifact_dir: non_empty("ARTIFACT_DIR").unwrap_or(defaults.artifact_dir),
            artifact_volume_claim: non_empty("ARTIFACT_VOLUME_CLAIM"),
            upload_block_size_bytes: positive_var(
                &lookup,
                "UPLOAD_BLOCK_SIZE_BYTES",
                defaults.upload_block_size_bytes,
            ),
            upload_parallelism: positive_var(
                &lookup,
                "UPLOAD_PARALLELISM",
                defaults.upload_parallelism,
            ),
            blob_endpoint: non_empty("AZURE_BLOB_ENDPOINT")
                .map(|endpoint| endpoint.trim_end_matches('/').to_string()),
            backoff_start_ms: positive_var(&lookup, "BACKOFF_START_MS", defaults.backoff_start_ms),
            backoff_max_ms: positive_var(&lookup, "BACKOFF_MAX_MS", defaults.backoff_max_ms),
            watch_restart_delay_secs: parse_var(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
            watch_restart_delay_after_end_secs: parse_var(
                &lookup,
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                defaults.watch_restart_delay_after_end_secs,
            ),
            metrics_port: parse_var(&lookup, "METRICS_PORT", defaults.metrics_port),
            watch_namespace: non_empty("WATCH_NAMESPACE"),
        }
    }

    /// Get backup interval duration
    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    /// Get poll interval duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Get the workload deadline, `None` when disabled
    pub fn workload_timeout(&self) -> Option<Duration> {
        (self.workload_timeout_secs > 0).then(|| Duration::from_secs(self.workload_timeout_secs))
    }

    /// Get busy requeue duration
    pub fn busy_requeue(&self) -> Duration {
        Duration::from_secs(self.busy_requeue_secs)
    }

    /// Local path of the dump for a resource
    pub fn artifact_path(&self, resource_name: &str) -> String {
        format!(
            "{}/{}.sql",
            self.artifact_dir.trim_end_matches('/'),
            resource_name
        )
    }
}

/// Parse `key`, keeping `default` when unset or unparseable
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    if let Ok(value) = raw.trim().parse() {
        value
    } else {
        warn!(key, value = raw.as_str(), default = %default, "Invalid value, using default");
        default
    }
}

/// Like [`parse_var`], but zero also falls back to `default`
fn positive_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display + PartialOrd + Default + Copy,
{
    let value = parse_var(lookup, key, default);
    if value > T::default() {
        value
    } else {
        warn!(key, default = %default, "Value must be greater than zero, using default");
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ControllerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let config = config_from(&[]);
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.backup_interval(), Duration::from_secs(86_400));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.upload_block_size_bytes, 4 * 1024 * 1024);
        assert_eq!(config.upload_parallelism, 16);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("BACKUP_INTERVAL_SECS", "3600"),
            ("DUMP_IMAGE", "postgres:16"),
            ("ARTIFACT_VOLUME_CLAIM", "pg-dumps"),
            ("AZURE_BLOB_ENDPOINT", "http://azurite:10000/devstoreaccount1/"),
            ("WATCH_NAMESPACE", "databases"),
        ]);
        assert_eq!(config.backup_interval_secs, 3600);
        assert_eq!(config.dump_image, "postgres:16");
        assert_eq!(config.artifact_volume_claim.as_deref(), Some("pg-dumps"));
        assert_eq!(
            config.blob_endpoint.as_deref(),
            Some("http://azurite:10000/devstoreaccount1")
        );
        assert_eq!(config.watch_namespace.as_deref(), Some("databases"));
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("POLL_INTERVAL_SECS", "0"),
            ("UPLOAD_PARALLELISM", "many"),
            ("METRICS_PORT", "99999"),
            ("DUMP_IMAGE", "  "),
        ]);
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.upload_parallelism, 16);
        assert_eq!(config.metrics_port, 5000);
        assert_eq!(config.dump_image, "postgres:latest");
    }

    #[test]
    fn test_zero_intervals_fall_back_to_defaults() {
        let config = config_from(&[
            ("BACKUP_INTERVAL_SECS", "0"),
            ("BUSY_REQUEUE_SECS", "0"),
            ("BACKOFF_START_MS", "0"),
            ("UPLOAD_BLOCK_SIZE_BYTES", "0"),
        ]);
        let defaults = ControllerConfig::default();
        assert_eq!(config.backup_interval_secs, defaults.backup_interval_secs);
        assert_eq!(config.busy_requeue_secs, defaults.busy_requeue_secs);
        assert_eq!(config.backoff_start_ms, defaults.backoff_start_ms);
        assert_eq!(config.upload_block_size_bytes, defaults.upload_block_size_bytes);
        assert!(config.backup_interval() > Duration::ZERO);
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        assert_eq!(config_from(&[("WORKLOAD_TIMEOUT_SECS", "0")]).workload_timeout(), None);
        assert_eq!(
            config_from(&[("WORKLOAD_TIMEOUT_SECS", "60")]).workload_timeout(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_artifact_path_keyed_by_resource_name() {
        let mut config = ControllerConfig::default();
        assert_eq!(config.artifact_path("nightly"), "/tmp/nightly.sql");
        config.artifact_dir = "/dumps/".to_string();
        assert_eq!(config.artifact_path("nightly"), "/dumps/nightly.sql");
    }
}
