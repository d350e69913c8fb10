//! # Artifact Storage
//!
//! Upload of finished dump files to object storage.
//!
//! The reconciler only depends on [`ArtifactStore`]; [`AzureBlobStore`] is the
//! production implementation talking to Azure Blob Storage with a storage
//! account shared key.

mod azure_blob;
pub mod shared_key;

pub use azure_blob::AzureBlobStore;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use zeroize::Zeroizing;

/// Upload stage failures
#[derive(Debug, Error)]
pub enum TransferError {
    /// Credentials rejected or unusable
    #[error("authentication failed for storage account '{account}': {message}")]
    Auth { account: String, message: String },

    /// Local artifact could not be opened or read
    #[error("cannot read local artifact '{path}': {source}")]
    LocalFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Network failure or unexpected response from the storage service
    #[error("transfer of '{blob}' failed: {message}")]
    Transfer { blob: String, message: String },
}

impl TransferError {
    /// Short label used for metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::Auth { .. } => "auth",
            TransferError::LocalFile { .. } => "local-file",
            TransferError::Transfer { .. } => "transfer",
        }
    }
}

/// Everything needed to archive one dump
pub struct UploadRequest {
    /// File produced by the dump pod
    pub local_path: PathBuf,
    /// Storage account name
    pub account: String,
    /// Target container
    pub container: String,
    /// Blob name inside the container
    pub blob_name: String,
    /// Base64 account key
    pub account_key: Zeroizing<String>,
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("local_path", &self.local_path)
            .field("account", &self.account)
            .field("container", &self.container)
            .field("blob_name", &self.blob_name)
            .field("account_key", &"***")
            .finish()
    }
}

/// Result of a completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Full blob URL
    pub url: String,
    /// Bytes transferred
    pub bytes: u64,
    /// Number of blocks, 1 for a single-shot upload
    pub blocks: usize,
}

/// Destination for finished dumps
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `request.local_path` to `request.container/request.blob_name`,
    /// replacing any existing blob with the same name
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, TransferError>;
}
