//! Common test utilities for reconciler integration tests
//!
//! In-memory stand-ins for the Kubernetes API and blob storage, plus the
//! standard `PostgresBackup` fixture used across the suites.

#![allow(dead_code, reason = "Not every suite uses every helper")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodStatus, Secret};
use k8s_openapi::ByteString;
use postgres_backup_controller::config::ControllerConfig;
use postgres_backup_controller::controller::reconciler::workload::workload_labels;
use postgres_backup_controller::controller::reconciler::{
    BackupRequestApi, Reconciler, SecretSource, WorkloadApi,
};
use postgres_backup_controller::crd::{PostgresBackup, PostgresBackupSpec, SecretKeyRef};
use postgres_backup_controller::storage::{
    ArtifactStore, TransferError, UploadReceipt, UploadRequest,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// This must be called before any async operations that use rustls.
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // The provider may already be installed by another test binary setup
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub const NAMESPACE: &str = "databases";
pub const NAME: &str = "nightly";
pub const PASSWORD: &str = "s3cr3t-password";
pub const ACCOUNT_KEY: &str = "dGVzdC1hY2NvdW50LWtleS0wMTIzNDU2Nzg5";

/// Error the reconciler treats as transient (transport level)
pub fn transient_error() -> kube::Error {
    kube::Error::Service("connection reset by peer".into())
}

/// Error the reconciler treats as permanent
pub fn permanent_error() -> kube::Error {
    kube::Error::SerdeError(serde_json::from_str::<u8>("x").unwrap_err())
}

/// The standard backup request: db.internal:5432, user app, database appdb,
/// container backups in account acct1
pub fn backup_fixture() -> PostgresBackup {
    let mut backup = PostgresBackup::new(
        NAME,
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
    backup.metadata.namespace = Some(NAMESPACE.to_string());
    backup.metadata.uid = Some("5e0a2c1d-7c43-4b8e-9f1a-2d3c4b5a6978".to_string());
    backup.metadata.generation = Some(1);
    backup
}

pub fn secret(name: &str, pairs: &[(&str, &str)]) -> Secret {
    let data: BTreeMap<String, ByteString> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
        .collect();
    let mut secret = Secret {
        data: Some(data),
        ..Default::default()
    };
    secret.metadata.name = Some(name.to_string());
    secret.metadata.namespace = Some(NAMESPACE.to_string());
    secret
}

/// Controller settings with the production defaults
pub fn test_config() -> ControllerConfig {
    ControllerConfig::default()
}

/// What the fake returns for one pod read
#[derive(Debug, Clone)]
pub enum PollStep {
    Phase(&'static str),
    FailedWith(&'static str),
    Transient,
    Permanent,
    Vanish,
}

#[derive(Default)]
struct ClusterState {
    backups: HashMap<String, PostgresBackup>,
    secrets: HashMap<String, Secret>,
    pods: HashMap<String, Pod>,
    created: Vec<Pod>,
    deleted: Vec<String>,
    status_patches: Vec<Value>,
    poll_script: VecDeque<PollStep>,
    default_step: Option<PollStep>,
    pod_reads: usize,
    fail_deletes: bool,
    fail_status_patches: bool,
}

/// In-memory Kubernetes API
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// JSON merge patch (RFC 7386)
fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (k, v) in patch_map {
            if v.is_null() {
                target_map.remove(k);
            } else {
                merge(target_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

impl FakeCluster {
    /// Cluster holding the fixture and both of its secrets
    pub fn with_fixture() -> Self {
        let cluster = Self::default();
        cluster.put_backup(backup_fixture());
        cluster.put_secret(secret("pgsec", &[("password", PASSWORD)]));
        cluster.put_secret(secret("azsec", &[("key", ACCOUNT_KEY)]));
        cluster
    }

    pub fn put_backup(&self, backup: PostgresBackup) {
        let k = key(
            backup.metadata.namespace.as_deref().unwrap_or_default(),
            backup.metadata.name.as_deref().unwrap_or_default(),
        );
        self.state.lock().unwrap().backups.insert(k, backup);
    }

    pub fn remove_backup(&self) {
        self.state.lock().unwrap().backups.remove(&key(NAMESPACE, NAME));
    }

    pub fn put_secret(&self, secret: Secret) {
        let k = key(
            secret.metadata.namespace.as_deref().unwrap_or_default(),
            secret.metadata.name.as_deref().unwrap_or_default(),
        );
        self.state.lock().unwrap().secrets.insert(k, secret);
    }

    /// Pre-existing pod, e.g. left behind by an earlier attempt
    pub fn put_pod(&self, name: &str) {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some(NAMESPACE.to_string());
        self.state
            .lock()
            .unwrap()
            .pods
            .insert(name.to_string(), pod);
    }

    /// Pre-existing pod carrying the dump labels of `resource`, with no
    /// status record pointing at it
    pub fn put_labelled_pod(&self, name: &str, resource: &str) {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some(NAMESPACE.to_string());
        pod.metadata.labels = Some(workload_labels(resource));
        self.state
            .lock()
            .unwrap()
            .pods
            .insert(name.to_string(), pod);
    }

    /// Steps returned by successive pod reads; `default_step` afterwards
    pub fn script(&self, steps: Vec<PollStep>, default_step: PollStep) {
        let mut state = self.state.lock().unwrap();
        state.poll_script = steps.into();
        state.default_step = Some(default_step);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.state.lock().unwrap().fail_deletes = fail;
    }

    pub fn fail_status_patches(&self, fail: bool) {
        self.state.lock().unwrap().fail_status_patches = fail;
    }

    pub fn backup(&self) -> PostgresBackup {
        self.state
            .lock()
            .unwrap()
            .backups
            .get(&key(NAMESPACE, NAME))
            .cloned()
            .unwrap()
    }

    /// Replace the stored resource after applying `edit`
    pub fn edit_backup(&self, edit: impl FnOnce(&mut PostgresBackup)) {
        let mut backup = self.backup();
        edit(&mut backup);
        self.put_backup(backup);
    }

    pub fn created(&self) -> Vec<Pod> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created()
            .iter()
            .filter_map(|p| p.metadata.name.clone())
            .collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn live_pods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().unwrap().pods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn status_patches(&self) -> Vec<Value> {
        self.state.lock().unwrap().status_patches.clone()
    }

    pub fn pod_reads(&self) -> usize {
        self.state.lock().unwrap().pod_reads
    }
}

#[async_trait]
impl BackupRequestApi for FakeCluster {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PostgresBackup>, kube::Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .backups
            .get(&key(namespace, name))
            .cloned())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: Value,
    ) -> Result<(), kube::Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_status_patches {
            return Err(transient_error());
        }
        state.status_patches.push(status.clone());
        let Some(backup) = state.backups.get_mut(&key(namespace, name)) else {
            return Err(permanent_error());
        };
        let mut current = serde_json::to_value(backup.status.clone().unwrap_or_default())
            .map_err(kube::Error::SerdeError)?;
        merge(&mut current, &status);
        backup.status = Some(serde_json::from_value(current).map_err(kube::Error::SerdeError)?);
        Ok(())
    }
}

#[async_trait]
impl SecretSource for FakeCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .secrets
            .get(&key(namespace, name))
            .cloned())
    }
}

#[async_trait]
impl WorkloadApi for FakeCluster {
    async fn create(&self, _namespace: &str, pod: &Pod) -> Result<Pod, kube::Error> {
        let mut state = self.state.lock().unwrap();
        let name = pod.metadata.name.clone().unwrap_or_default();
        state.created.push(pod.clone());
        state.pods.insert(name, pod.clone());
        Ok(pod.clone())
    }

    async fn get(&self, _namespace: &str, name: &str) -> Result<Option<Pod>, kube::Error> {
        let mut state = self.state.lock().unwrap();
        state.pod_reads += 1;
        let step = state
            .poll_script
            .pop_front()
            .or_else(|| state.default_step.clone())
            .unwrap_or(PollStep::Phase("Succeeded"));

        let (phase, message) = match step {
            PollStep::Transient => return Err(transient_error()),
            PollStep::Permanent => return Err(permanent_error()),
            PollStep::Vanish => {
                state.pods.remove(name);
                return Ok(None);
            }
            PollStep::Phase(phase) => (phase, None),
            PollStep::FailedWith(message) => ("Failed", Some(message.to_string())),
        };

        Ok(state.pods.get_mut(name).map(|pod| {
            pod.status = Some(PodStatus {
                phase: Some(phase.to_string()),
                message,
                ..Default::default()
            });
            pod.clone()
        }))
    }

    async fn delete(&self, _namespace: &str, name: &str) -> Result<(), kube::Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_deletes {
            return Err(transient_error());
        }
        state.pods.remove(name);
        state.deleted.push(name.to_string());
        Ok(())
    }

    async fn list(
        &self,
        _namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<String>, kube::Error> {
        let wanted: Vec<(&str, &str)> = label_selector
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .collect();
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .pods
            .iter()
            .filter(|(_, pod)| {
                let labels = pod.metadata.labels.clone().unwrap_or_default();
                wanted
                    .iter()
                    .all(|(k, v)| labels.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// One recorded upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub local_path: String,
    pub account: String,
    pub container: String,
    pub blob_name: String,
    pub account_key: String,
}

/// In-memory artifact store
#[derive(Default)]
pub struct FakeStore {
    uploads: Mutex<Vec<RecordedUpload>>,
    fail_with_auth: Mutex<bool>,
}

impl FakeStore {
    pub fn fail_with_auth(&self, fail: bool) {
        *self.fail_with_auth.lock().unwrap() = fail;
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for FakeStore {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, TransferError> {
        self.uploads.lock().unwrap().push(RecordedUpload {
            local_path: request.local_path.display().to_string(),
            account: request.account.clone(),
            container: request.container.clone(),
            blob_name: request.blob_name.clone(),
            account_key: request.account_key.to_string(),
        });
        if *self.fail_with_auth.lock().unwrap() {
            return Err(TransferError::Auth {
                account: request.account.clone(),
                message: "HTTP 403: AuthenticationFailed".to_string(),
            });
        }
        Ok(UploadReceipt {
            url: format!(
                "https://{}.blob.core.windows.net/{}/{}",
                request.account, request.container, request.blob_name
            ),
            bytes: 2048,
            blocks: 1,
        })
    }
}

/// Reconciler wired to fakes
pub struct Harness {
    pub cluster: Arc<FakeCluster>,
    pub store: Arc<FakeStore>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_cluster(FakeCluster::with_fixture(), config)
    }

    pub fn with_cluster(cluster: FakeCluster, config: ControllerConfig) -> Self {
        let cluster = Arc::new(cluster);
        let store = Arc::new(FakeStore::default());
        let reconciler = Arc::new(Reconciler::with_backends(
            Arc::new(config),
            Arc::clone(&cluster) as Arc<dyn BackupRequestApi>,
            Arc::clone(&cluster) as Arc<dyn SecretSource>,
            Arc::clone(&cluster) as Arc<dyn WorkloadApi>,
            Arc::clone(&store) as Arc<dyn ArtifactStore>,
        ));
        Self {
            cluster,
            store,
            reconciler,
        }
    }

    /// The object handed to `reconcile`, as a watch event would
    pub fn object(&self) -> Arc<PostgresBackup> {
        Arc::new(backup_fixture())
    }
}
