//! # Reconciliation Logic
//!
//! One backup attempt for a PostgresBackup resource.
//!
//! ```text
//! load -> validate -> schedule check -> lock -> sweep leftovers
//!      -> resolve credentials -> build + submit pod -> await completion
//!      -> upload dump -> teardown pod -> status update -> requeue 24h
//! ```
//!
//! Any failing stage aborts the attempt and the error is returned to the
//! controller runtime, whose error policy schedules the retry. A failed attempt
//! never writes `lastBackupTime` or `backupStatus`. The dump pod is deleted
//! after every attempt that created it; a failed delete is queued in
//! `status.pendingCleanup` instead of failing the attempt.

use crate::controller::reconciler::lifecycle::{
    self, WaitSettings, WorkloadOutcome, PHASE_PENDING,
};
use crate::controller::reconciler::schedule::{self, ScheduleDecision};
use crate::controller::reconciler::secrets;
use crate::controller::reconciler::status;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError, TriggerSource};
use crate::controller::reconciler::validation::validate_spec;
use crate::controller::reconciler::workload::{build_dump_pod, workload_name, workload_selector};
use crate::crd::PostgresBackup;
use crate::observability::metrics;
use crate::storage::UploadRequest;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Reconcile one PostgresBackup
///
/// The object handed over by the watch is only used for its identity; the
/// resource is re-read so the attempt works on current state.
///
/// # Errors
/// Returns the error of the first failing stage
pub async fn reconcile(
    obj: Arc<PostgresBackup>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| ReconcilerError::MissingNamespace(name.clone()))?;

    let span = info_span!(
        "reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str()
    );

    metrics::increment_reconciliations();
    let start = std::time::Instant::now();
    let result = run_attempt(&ctx, &namespace, &name).instrument(span).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        metrics::increment_backups_failed(e.stage());
    }
    result
}

async fn run_attempt(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let config = Arc::clone(&ctx.config);

    // Loading
    let Some(backup) = ctx
        .backups
        .get(namespace, name)
        .await
        .map_err(|e| ReconcilerError::Load {
            namespace: namespace.to_string(),
            name: name.to_string(),
            source: e,
        })?
    else {
        debug!("PostgresBackup no longer exists, nothing to do");
        ctx.forget(namespace, name);
        return Ok(Action::await_change());
    };

    validate_spec(&backup.spec)?;

    let trigger = match schedule::evaluate(&backup, chrono::Utc::now()) {
        ScheduleDecision::Due(trigger) => trigger,
        ScheduleDecision::NotDue { wait } => {
            debug!(wait_secs = wait.as_secs(), "Backup not due yet");
            metrics::increment_requeues_total("schedule");
            return Ok(Action::requeue(wait));
        }
    };

    if let Some(wait) = ctx.pending_retry(namespace, name, backup.metadata.generation) {
        debug!(wait_secs = wait.as_secs(), "Error backoff still running");
        metrics::increment_requeues_total(TriggerSource::ErrorBackoff.as_str());
        return Ok(Action::requeue(wait));
    }

    let lock = ctx.backup_lock(namespace, name);
    let Ok(_guard) = lock.try_lock() else {
        info!("Backup already in progress for this resource, requeueing");
        metrics::increment_requeues_total("busy");
        return Ok(Action::requeue(config.busy_requeue()));
    };

    info!(trigger = trigger.as_str(), "Starting backup");

    let mut pending_cleanup = sweep_leftovers(ctx, &backup, namespace).await;

    // Credential resolution
    let password =
        secrets::resolve(ctx.secrets.as_ref(), namespace, &backup.spec.postgres_secret).await?;
    let account_key =
        secrets::resolve(ctx.secrets.as_ref(), namespace, &backup.spec.azure_secret).await?;

    // Workload run
    let artifact_path = config.artifact_path(name);
    let pod_name = workload_name(name);
    let pod = build_dump_pod(&backup, &pod_name, &artifact_path, &password, &config)?;
    drop(password);

    let workload = lifecycle::submit(ctx.workloads.as_ref(), namespace, &pod).await?;
    drop(pod);

    if let Err(e) = ctx
        .backups
        .patch_status(namespace, name, status::active_patch(&workload, PHASE_PENDING))
        .await
    {
        warn!(workload = workload.as_str(), error = %e, "Failed to record active workload");
    }

    let workload_start = std::time::Instant::now();
    let outcome = lifecycle::await_completion(
        ctx.workloads.as_ref(),
        namespace,
        &workload,
        &WaitSettings::from_config(&config),
        &ctx.shutdown,
    )
    .await;
    metrics::observe_workload_duration(workload_start.elapsed().as_secs_f64());

    let final_phase = outcome.as_ref().ok().map(WorkloadOutcome::phase);

    let run_result = match outcome {
        Ok(WorkloadOutcome::Succeeded) => {
            info!(workload = workload.as_str(), "Dump finished, uploading artifact");
            // Transfer
            let request = UploadRequest {
                local_path: PathBuf::from(&artifact_path),
                account: backup.spec.storage_account.clone(),
                container: backup.spec.container_name.clone(),
                blob_name: format!("{name}.sql"),
                account_key,
            };
            let upload_start = std::time::Instant::now();
            match ctx.store.upload(&request).await {
                Ok(receipt) => {
                    metrics::observe_upload(
                        receipt.bytes,
                        upload_start.elapsed().as_secs_f64(),
                    );
                    info!(
                        blob = receipt.url.as_str(),
                        bytes = receipt.bytes,
                        "Artifact uploaded"
                    );
                    Ok(())
                }
                Err(e) => {
                    metrics::increment_upload_errors(e.kind());
                    Err(ReconcilerError::from(e))
                }
            }
        }
        Ok(WorkloadOutcome::Failed { message }) => Err(ReconcilerError::WorkloadFailure {
            workload: workload.clone(),
            message,
        }),
        Err(e) => Err(e),
    };

    // Teardown never changes the outcome of the attempt
    if let Err(e) = lifecycle::teardown(ctx.workloads.as_ref(), namespace, &workload).await {
        warn!(error = %e, "Dump pod cleanup failed, queued for the next attempt");
        metrics::increment_teardown_failures();
        pending_cleanup.push(workload.clone());
    }

    if let Err(e) = run_result {
        error!(
            workload = workload.as_str(),
            stage = e.stage(),
            error = %e,
            "Backup attempt failed"
        );
        if let Err(patch_err) = ctx
            .backups
            .patch_status(
                namespace,
                name,
                status::attempt_end_patch(final_phase, &pending_cleanup),
            )
            .await
        {
            warn!(error = %patch_err, "Failed to clear active workload");
        }
        return Err(e);
    }

    // Status update
    let completed_at = chrono::Utc::now();
    let interval = config.backup_interval();
    let next_backup_at = completed_at
        + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::days(1));
    let handled_trigger = schedule::manual_trigger(&backup);

    ctx.backups
        .patch_status(
            namespace,
            name,
            status::success_patch(
                &backup,
                completed_at,
                next_backup_at,
                &pending_cleanup,
                handled_trigger,
            ),
        )
        .await
        .map_err(|e| ReconcilerError::Status { source: e })?;

    metrics::increment_backups_succeeded();
    ctx.reset_backoff(namespace, name);

    info!(
        trigger = trigger.as_str(),
        next_backup_time = next_backup_at.to_rfc3339(),
        "Backup completed"
    );
    metrics::increment_requeues_total("schedule");
    Ok(Action::requeue(interval))
}

/// Delete dump pods left behind by earlier attempts
///
/// Covers the pod of an attempt that never finished (`activeWorkload`), pods
/// whose deletion failed before (`pendingCleanup`) and any other pod carrying
/// this resource's labels, which catches attempts that died before their
/// pod was recorded. Returns the names that still could not be deleted.
async fn sweep_leftovers(
    ctx: &Reconciler,
    backup: &PostgresBackup,
    namespace: &str,
) -> Vec<String> {
    let name = backup.name_any();
    let mut leftovers: Vec<String> = Vec::new();
    let mut recorded = false;

    if let Some(current) = backup.status.as_ref() {
        leftovers.extend(current.pending_cleanup.iter().cloned());
        if let Some(active) = current.active_workload.as_ref() {
            warn!(workload = active.as_str(), "Found workload of an unfinished attempt");
            if !leftovers.contains(active) {
                leftovers.push(active.clone());
            }
        }
        recorded = !leftovers.is_empty();
    }

    match ctx
        .workloads
        .list(namespace, &workload_selector(&name))
        .await
    {
        Ok(labelled) => {
            for pod in labelled {
                if !leftovers.contains(&pod) {
                    warn!(workload = pod.as_str(), "Found unrecorded dump pod");
                    leftovers.push(pod);
                }
            }
        }
        Err(e) => warn!(error = %e, "Failed to list dump pods of earlier attempts"),
    }

    if leftovers.is_empty() {
        return Vec::new();
    }

    let mut remaining = Vec::new();
    for workload in leftovers {
        match lifecycle::teardown(ctx.workloads.as_ref(), namespace, &workload).await {
            Ok(()) => info!(workload = workload.as_str(), "Swept leftover dump pod"),
            Err(e) => {
                warn!(error = %e, "Leftover dump pod still cannot be deleted");
                metrics::increment_teardown_failures();
                remaining.push(workload);
            }
        }
    }

    if recorded || !remaining.is_empty() {
        if let Err(e) = ctx
            .backups
            .patch_status(namespace, &name, status::sweep_patch(&remaining))
            .await
        {
            warn!(error = %e, "Failed to record cleanup sweep");
        }
    }
    remaining
}
