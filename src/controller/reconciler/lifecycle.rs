//! # Workload Lifecycle
//!
//! Submit a dump pod, wait for it to reach a terminal phase, delete it.
//!
//! The wait polls the pod phase on a fixed interval and is bounded by an
//! optional deadline and a cancellation token. Transient API read failures are
//! retried with bounded exponential backoff; a pod that disappears mid-wait is
//! a permanent failure.

use crate::config::ControllerConfig;
use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::cluster::{is_transient, WorkloadApi};
use crate::controller::reconciler::types::ReconcilerError;
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Pod;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const PHASE_PENDING: &str = "Pending";
pub const PHASE_SUCCEEDED: &str = "Succeeded";
pub const PHASE_FAILED: &str = "Failed";

/// Terminal result reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadOutcome {
    Succeeded,
    Failed { message: String },
}

impl WorkloadOutcome {
    #[must_use]
    pub fn phase(&self) -> &'static str {
        match self {
            WorkloadOutcome::Succeeded => PHASE_SUCCEEDED,
            WorkloadOutcome::Failed { .. } => PHASE_FAILED,
        }
    }
}

/// Polling behaviour of [`await_completion`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSettings {
    pub poll_interval: Duration,
    /// `None` waits forever
    pub timeout: Option<Duration>,
    pub retry_start: Duration,
    pub retry_max: Duration,
    pub retry_max_attempts: u32,
}

impl WaitSettings {
    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.workload_timeout(),
            retry_start: Duration::from_millis(config.poll_retry_start_ms),
            retry_max: Duration::from_millis(config.poll_retry_max_ms),
            retry_max_attempts: config.poll_retry_max_attempts,
        }
    }
}

/// Create the dump pod, returning its name
///
/// # Errors
/// Returns [`ReconcilerError::WorkloadSubmit`] if the API rejects the pod
#[instrument(skip(workloads, pod))]
pub async fn submit(
    workloads: &dyn WorkloadApi,
    namespace: &str,
    pod: &Pod,
) -> Result<String, ReconcilerError> {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let created = workloads
        .create(namespace, pod)
        .await
        .map_err(|e| ReconcilerError::WorkloadSubmit {
            workload: name.clone(),
            source: e,
        })?;

    let name = created.metadata.name.unwrap_or(name);
    info!(workload = name.as_str(), "Submitted dump pod");
    Ok(name)
}

/// Wait until the pod reaches `Succeeded` or `Failed`
///
/// # Errors
/// - [`ReconcilerError::Timeout`] when the deadline passes first
/// - [`ReconcilerError::Cancelled`] when `cancel` fires first
/// - [`ReconcilerError::WorkloadVanished`] when the pod no longer exists
/// - [`ReconcilerError::WorkloadRead`] on a permanent read error or once
///   transient retries are exhausted
#[instrument(skip(workloads, settings, cancel))]
pub async fn await_completion(
    workloads: &dyn WorkloadApi,
    namespace: &str,
    name: &str,
    settings: &WaitSettings,
    cancel: &CancellationToken,
) -> Result<WorkloadOutcome, ReconcilerError> {
    let poll = poll_until_terminal(workloads, namespace, name, settings);

    let bounded = async {
        match settings.timeout {
            Some(timeout) => tokio::time::timeout(timeout, poll).await.map_err(|_| {
                ReconcilerError::Timeout {
                    workload: name.to_string(),
                    timeout,
                }
            })?,
            None => poll.await,
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            warn!(workload = name, "Wait for dump pod cancelled");
            Err(ReconcilerError::Cancelled { workload: name.to_string() })
        }
        result = bounded => result,
    }
}

async fn poll_until_terminal(
    workloads: &dyn WorkloadApi,
    namespace: &str,
    name: &str,
    settings: &WaitSettings,
) -> Result<WorkloadOutcome, ReconcilerError> {
    let mut retry = ExponentialBackoff::new(
        settings.retry_start,
        settings.retry_max,
        settings.retry_max_attempts,
    );

    loop {
        match workloads.get(namespace, name).await {
            Ok(Some(pod)) => {
                retry.reset();
                let phase = pod
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .unwrap_or(PHASE_PENDING);
                match phase {
                    PHASE_SUCCEEDED => return Ok(WorkloadOutcome::Succeeded),
                    PHASE_FAILED => {
                        return Ok(WorkloadOutcome::Failed {
                            message: failure_message(&pod),
                        })
                    }
                    _ => debug!(workload = name, phase, "Dump pod still running"),
                }
                tokio::time::sleep(settings.poll_interval).await;
            }
            Ok(None) => {
                return Err(ReconcilerError::WorkloadVanished {
                    workload: name.to_string(),
                })
            }
            Err(e) if is_transient(&e) => match retry.next_delay() {
                Some(delay) => {
                    warn!(
                        workload = name,
                        attempt = retry.attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Transient error reading dump pod, retrying"
                    );
                    metrics::increment_poll_retries();
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(ReconcilerError::WorkloadRead {
                        workload: name.to_string(),
                        source: e,
                    })
                }
            },
            Err(e) => {
                return Err(ReconcilerError::WorkloadRead {
                    workload: name.to_string(),
                    source: e,
                })
            }
        }
    }
}

/// Platform-reported failure reason
///
/// Prefers `status.message`; falls back to the terminated container's reason
/// and exit code.
#[must_use]
pub fn failure_message(pod: &Pod) -> String {
    let status = pod.status.as_ref();

    if let Some(message) = status
        .and_then(|s| s.message.as_deref())
        .filter(|m| !m.trim().is_empty())
    {
        return message.to_string();
    }

    let terminated = status
        .and_then(|s| s.container_statuses.as_ref())
        .into_iter()
        .flatten()
        .find_map(|cs| {
            cs.state
                .as_ref()
                .and_then(|state| state.terminated.as_ref())
                .map(|t| (cs.name.as_str(), t))
        });

    match terminated {
        Some((container, t)) => {
            let reason = t.reason.as_deref().unwrap_or("Error");
            match t.message.as_deref().filter(|m| !m.trim().is_empty()) {
                Some(detail) => format!(
                    "container {container} terminated: {reason} (exit code {}): {detail}",
                    t.exit_code
                ),
                None => format!(
                    "container {container} terminated: {reason} (exit code {})",
                    t.exit_code
                ),
            }
        }
        None => status
            .and_then(|s| s.reason.clone())
            .unwrap_or_else(|| "pod failed without a reported reason".to_string()),
    }
}

/// Delete the dump pod
///
/// # Errors
/// Returns [`ReconcilerError::Teardown`] if the delete call fails; a pod that
/// is already gone is not an error.
#[instrument(skip(workloads))]
pub async fn teardown(
    workloads: &dyn WorkloadApi,
    namespace: &str,
    name: &str,
) -> Result<(), ReconcilerError> {
    workloads
        .delete(namespace, name)
        .await
        .map_err(|e| ReconcilerError::Teardown {
            workload: name.to_string(),
            source: e,
        })?;
    debug!(workload = name, "Deleted dump pod");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStatus, PodStatus,
    };

    fn failed_pod(message: Option<&str>, terminated: Option<ContainerStateTerminated>) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some("Failed".to_string()),
                message: message.map(str::to_string),
                container_statuses: terminated.map(|t| {
                    vec![ContainerStatus {
                        name: "pg-dump".to_string(),
                        state: Some(ContainerState {
                            terminated: Some(t),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_failure_message_prefers_pod_message() {
        let pod = failed_pod(Some("Pod was evicted"), None);
        assert_eq!(failure_message(&pod), "Pod was evicted");
    }

    #[test]
    fn test_failure_message_falls_back_to_container_state() {
        let pod = failed_pod(
            Some(""),
            Some(ContainerStateTerminated {
                exit_code: 1,
                reason: Some("Error".to_string()),
                ..Default::default()
            }),
        );
        assert_eq!(
            failure_message(&pod),
            "container pg-dump terminated: Error (exit code 1)"
        );
    }

    #[test]
    fn test_failure_message_without_any_detail() {
        let pod = failed_pod(None, None);
        assert_eq!(failure_message(&pod), "pod failed without a reported reason");
    }

    #[test]
    fn test_wait_settings_follow_config() {
        let config = ControllerConfig {
            workload_timeout_secs: 0,
            ..ControllerConfig::default()
        };
        let settings = WaitSettings::from_config(&config);
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.timeout, None);
        assert_eq!(settings.retry_start, Duration::from_millis(500));
        assert_eq!(settings.retry_max, Duration::from_secs(30));
        assert_eq!(settings.retry_max_attempts, 5);
    }
}
