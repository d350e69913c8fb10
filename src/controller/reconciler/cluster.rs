//! # Cluster Access
//!
//! Narrow views of the Kubernetes API used by the reconciler.
//!
//! Each trait covers one kind of object. [`KubeCluster`] implements all of them
//! on top of a `kube::Client`; tests substitute in-memory fakes.

use crate::constants::CONTROLLER_NAME;
use crate::crd::PostgresBackup;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

/// Read and status-patch PostgresBackup resources
#[async_trait]
pub trait BackupRequestApi: Send + Sync {
    /// Fetch a resource, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str)
        -> Result<Option<PostgresBackup>, kube::Error>;

    /// Merge-patch the status subresource with `status`
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<(), kube::Error>;
}

/// Read namespaced secrets
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch a secret, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error>;
}

/// Create, observe and delete dump pods
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    async fn create(&self, namespace: &str, pod: &Pod) -> Result<Pod, kube::Error>;

    /// Fetch a pod, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Pod>, kube::Error>;

    /// Delete a pod; deleting a pod that is already gone succeeds
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;

    /// Names of the pods matching a label selector
    async fn list(&self, namespace: &str, label_selector: &str)
        -> Result<Vec<String>, kube::Error>;
}

/// Kubernetes API implementation of the cluster traits
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BackupRequestApi for KubeCluster {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PostgresBackup>, kube::Error> {
        let api: Api<PostgresBackup> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<(), kube::Error> {
        let api: Api<PostgresBackup> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "status": status
        });

        api.patch_status(
            name,
            &PatchParams::apply(CONTROLLER_NAME),
            &Patch::Merge(patch),
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SecretSource for KubeCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await
    }
}

#[async_trait]
impl WorkloadApi for KubeCluster {
    async fn create(&self, namespace: &str, pod: &Pod) -> Result<Pod, kube::Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), pod).await
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Pod>, kube::Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!(pod = name, namespace, "Dump pod already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<String>, kube::Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list_metadata(&ListParams::default().labels(label_selector))
            .await?;
        Ok(pods.items.into_iter().filter_map(|pod| pod.metadata.name).collect())
    }
}

/// Whether a Kubernetes API error is worth retrying
///
/// Timeouts (408), throttling (429), server errors (5xx) and transport-level
/// failures are transient. Everything else is permanent.
#[must_use]
pub fn is_transient(error: &kube::Error) -> bool {
    match error {
        kube::Error::Api(api_err) => {
            api_err.code == 408 || api_err.code == 429 || api_err.code >= 500
        }
        kube::Error::Service(_) | kube::Error::HyperError(_) | kube::Error::ReadEvents(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_transient() {
        let err = kube::Error::Service("connection reset by peer".into());
        assert!(is_transient(&err));
    }

    #[test]
    fn test_decode_errors_are_permanent() {
        let serde_err = serde_json::from_str::<u8>("not a number").unwrap_err();
        assert!(!is_transient(&kube::Error::SerdeError(serde_err)));
    }
}
