//! # Dump Workload
//!
//! Builds the single-container, run-once pod that executes `pg_dump`.
//!
//! The pod is owned by its PostgresBackup (controller owner reference), so
//! deleting the backup resource garbage-collects any dump still running.

use crate::config::ControllerConfig;
use crate::constants::{
    BACKUP_NAME_LABEL, CONTROLLER_NAME, DUMP_CONTAINER_NAME, MANAGED_BY_LABEL, PGPASSWORD_ENV,
};
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::{PostgresBackup, PostgresBackupSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, Pod, PodSpec, Volume, VolumeMount,
};
use kube::api::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;

const ARTIFACT_VOLUME_NAME: &str = "artifacts";

/// Maximum length of a label value
const LABEL_VALUE_MAX_LEN: usize = 63;

/// Maximum length of a pod name (DNS subdomain)
const POD_NAME_MAX_LEN: usize = 253;

const WORKLOAD_NAME_PREFIX: &str = "pg-dump-";

/// Unique pod name for one attempt: `pg-dump-{resource}-{8 hex chars}`
///
/// Long resource names are shortened so the result stays a valid pod name.
#[must_use]
pub fn workload_name(resource_name: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let max_base = POD_NAME_MAX_LEN - WORKLOAD_NAME_PREFIX.len() - 9;
    let base: String = resource_name.chars().take(max_base).collect();
    let base = base.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    format!("{WORKLOAD_NAME_PREFIX}{}-{}", base, &suffix[..8])
}

/// `pg_dump` arguments for a backup
#[must_use]
pub fn dump_args(spec: &PostgresBackupSpec, artifact_path: &str) -> Vec<String> {
    vec![
        format!("--host={}", spec.host),
        format!("--port={}", spec.port),
        format!("--username={}", spec.user),
        format!("--dbname={}", spec.db_name),
        format!("--file={artifact_path}"),
    ]
}

/// Labels identifying dump pods of a resource
#[must_use]
pub fn workload_labels(resource_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (BACKUP_NAME_LABEL.to_string(), label_value(resource_name)),
        (MANAGED_BY_LABEL.to_string(), CONTROLLER_NAME.to_string()),
    ])
}

/// Label selector matching the dump pods of a resource
#[must_use]
pub fn workload_selector(resource_name: &str) -> String {
    workload_labels(resource_name)
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn label_value(value: &str) -> String {
    let truncated: String = value.chars().take(LABEL_VALUE_MAX_LEN).collect();
    truncated
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Build the dump pod for one backup attempt
///
/// # Errors
/// Returns [`ReconcilerError::OwnerReference`] when the resource has no name or
/// uid, since an unowned pod could outlive its PostgresBackup.
pub fn build_dump_pod(
    backup: &PostgresBackup,
    workload_name: &str,
    artifact_path: &str,
    password: &str,
    config: &ControllerConfig,
) -> Result<Pod, ReconcilerError> {
    let resource_name = backup.metadata.name.as_deref().unwrap_or_default();
    let owner = backup.controller_owner_ref(&()).ok_or_else(|| {
        ReconcilerError::OwnerReference(format!(
            "PostgresBackup '{resource_name}' has no name or uid"
        ))
    })?;

    let claim = config.artifact_volume_claim.as_ref();
    let volume_mounts = claim.map(|_| {
        vec![VolumeMount {
            name: ARTIFACT_VOLUME_NAME.to_string(),
            mount_path: config.artifact_dir.clone(),
            ..Default::default()
        }]
    });
    let volumes = claim.map(|claim_name| {
        vec![Volume {
            name: ARTIFACT_VOLUME_NAME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim_name.clone(),
                read_only: Some(false),
            }),
            ..Default::default()
        }]
    });

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(workload_name.to_string()),
            namespace: backup.metadata.namespace.clone(),
            labels: Some(workload_labels(resource_name)),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            containers: vec![Container {
                name: DUMP_CONTAINER_NAME.to_string(),
                image: Some(config.dump_image.clone()),
                command: Some(vec!["pg_dump".to_string()]),
                args: Some(dump_args(&backup.spec, artifact_path)),
                env: Some(vec![EnvVar {
                    name: PGPASSWORD_ENV.to_string(),
                    value: Some(password.to_string()),
                    ..Default::default()
                }]),
                volume_mounts,
                ..Default::default()
            }],
            volumes,
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::SecretKeyRef;

    fn backup(uid: Option<&str>) -> PostgresBackup {
        let mut backup = PostgresBackup::new(
            "nightly",
            PostgresBackupSpec {
                host: "db.internal".to_string(),
                port: 5432,
                user: "app".to_string(),
                db_name: "appdb".to_string(),
                container_name: "backups".to_string(),
                storage_account: "acct1".to_string(),
                postgres_secret: SecretKeyRef {
                    name: "pgsec".to_string(),
                    key: "password".to_string(),
                },
                azure_secret: SecretKeyRef {
                    name: "azsec".to_string(),
                    key: "key".to_string(),
                },
            },
        );
        backup.metadata.namespace = Some("db".to_string());
        backup.metadata.uid = uid.map(str::to_string);
        backup
    }

    fn container(pod: &Pod) -> &Container {
        &pod.spec.as_ref().unwrap().containers[0]
    }

    #[test]
    fn test_workload_name_is_unique_per_attempt() {
        let first = workload_name("nightly");
        let second = workload_name("nightly");
        assert!(first.starts_with("pg-dump-nightly-"));
        assert_eq!(first.len(), "pg-dump-nightly-".len() + 8);
        assert_ne!(first, second);
    }

    #[test]
    fn test_pod_runs_pg_dump_once() {
        let config = ControllerConfig::default();
        let pod = build_dump_pod(
            &backup(Some("uid-1")),
            "pg-dump-nightly-0a1b2c3d",
            "/tmp/nightly.sql",
            "hunter2",
            &config,
        )
        .unwrap();

        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(spec.containers.len(), 1);

        let container = container(&pod);
        assert_eq!(container.name, "pg-dump");
        assert_eq!(container.image.as_deref(), Some("postgres:latest"));
        assert_eq!(container.command.as_deref(), Some(&["pg_dump".to_string()][..]));
        assert_eq!(
            container.args.as_deref().unwrap(),
            [
                "--host=db.internal",
                "--port=5432",
                "--username=app",
                "--dbname=appdb",
                "--file=/tmp/nightly.sql",
            ]
        );

        let env = container.env.as_ref().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].name, "PGPASSWORD");
        assert_eq!(env[0].value.as_deref(), Some("hunter2"));
        assert!(container.volume_mounts.is_none());
    }

    #[test]
    fn test_pod_is_owned_and_labelled() {
        let pod = build_dump_pod(
            &backup(Some("uid-1")),
            "pg-dump-nightly-0a1b2c3d",
            "/tmp/nightly.sql",
            "hunter2",
            &ControllerConfig::default(),
        )
        .unwrap();

        assert_eq!(pod.metadata.namespace.as_deref(), Some("db"));
        let owners = pod.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "PostgresBackup");
        assert_eq!(owners[0].name, "nightly");
        assert_eq!(owners[0].uid, "uid-1");
        assert_eq!(owners[0].controller, Some(true));

        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(BACKUP_NAME_LABEL).map(String::as_str), Some("nightly"));
        assert_eq!(
            labels.get(MANAGED_BY_LABEL).map(String::as_str),
            Some("postgres-backup-controller")
        );
    }

    #[test]
    fn test_missing_uid_is_owner_reference_error() {
        let err = build_dump_pod(
            &backup(None),
            "pg-dump-nightly-0a1b2c3d",
            "/tmp/nightly.sql",
            "hunter2",
            &ControllerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReconcilerError::OwnerReference(_)));
    }

    #[test]
    fn test_artifact_claim_is_mounted() {
        let config = ControllerConfig {
            artifact_dir: "/dumps".to_string(),
            artifact_volume_claim: Some("pg-dumps".to_string()),
            ..ControllerConfig::default()
        };
        let pod = build_dump_pod(
            &backup(Some("uid-1")),
            "pg-dump-nightly-0a1b2c3d",
            "/dumps/nightly.sql",
            "hunter2",
            &config,
        )
        .unwrap();

        let mounts = container(&pod).volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].mount_path, "/dumps");
        let volumes = pod.spec.as_ref().unwrap().volumes.as_ref().unwrap();
        assert_eq!(
            volumes[0]
                .persistent_volume_claim
                .as_ref()
                .map(|c| c.claim_name.as_str()),
            Some("pg-dumps")
        );
    }

    #[test]
    fn test_long_resource_name_label_is_truncated() {
        let long_name = format!("{}-x", "a".repeat(70));
        let labels = workload_labels(&long_name);
        let value = &labels[BACKUP_NAME_LABEL];
        assert_eq!(value.len(), LABEL_VALUE_MAX_LEN);
        assert!(value.chars().all(|c| c == 'a'));
    }

    #[test]
    fn test_long_resource_name_keeps_pod_name_valid() {
        let name = workload_name(&"a".repeat(253));
        assert_eq!(name.len(), POD_NAME_MAX_LEN);
        assert!(name.starts_with("pg-dump-aaa"));

        // A cut that lands on a separator must not leave "--" behind
        let dotted = format!("{}.{}", "b".repeat(235), "c".repeat(10));
        let name = workload_name(&dotted);
        assert!(name.len() <= POD_NAME_MAX_LEN);
        assert!(!name.contains(".-"), "unexpected name {name}");
    }

    #[test]
    fn test_selector_matches_pod_labels() {
        assert_eq!(
            workload_selector("nightly"),
            "app.kubernetes.io/managed-by=postgres-backup-controller,\
             database.muntashirislam.com/backup=nightly"
        );
    }
}
