//! Azure Blob Storage REST client
//!
//! Native REST implementation of the three Blob service calls needed to write a
//! block blob. Uses reqwest with rustls and Shared Key authorization.
//!
//! - Files that fit in one block: `Put Blob`
//! - Larger files: `Put Block` per block (bounded parallelism) then `Put Block List`
//!
//! Blocks are read from disk by the task uploading them, so memory use is
//! bounded by `block_size * parallelism` regardless of dump size.
//!
//! References:
//! - [Put Blob](https://learn.microsoft.com/rest/api/storageservices/put-blob)
//! - [Put Block](https://learn.microsoft.com/rest/api/storageservices/put-block)
//! - [Put Block List](https://learn.microsoft.com/rest/api/storageservices/put-block-list)

use super::shared_key::SharedKeyCredential;
use super::{ArtifactStore, TransferError, UploadReceipt, UploadRequest};
use crate::config::ControllerConfig;
use crate::constants::AZURE_STORAGE_API_VERSION;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode, Url};
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

/// Azure Blob Storage artifact store
pub struct AzureBlobStore {
    http_client: Client,
    endpoint: Option<String>,
    block_size: usize,
    parallelism: usize,
}

impl std::fmt::Debug for AzureBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureBlobStore")
            .field("endpoint", &self.endpoint)
            .field("block_size", &self.block_size)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

impl AzureBlobStore {
    /// Create a client from controller configuration
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &ControllerConfig) -> anyhow::Result<Self> {
        Self::with_settings(
            config.blob_endpoint.clone(),
            config.upload_block_size_bytes,
            config.upload_parallelism,
        )
    }

    /// Create a client with explicit endpoint and chunking settings
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn with_settings(
        endpoint: Option<String>,
        block_size: usize,
        parallelism: usize,
    ) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            block_size: block_size.max(1),
            parallelism: parallelism.max(1),
        })
    }

    /// URL of a blob
    ///
    /// `https://{account}.blob.core.windows.net/{container}/{blob}`, or
    /// `{endpoint}/{container}/{blob}` when an endpoint override is configured.
    ///
    /// # Errors
    /// Returns [`TransferError::Transfer`] if the resulting URL is malformed
    pub fn blob_url(&self, account: &str, container: &str, blob: &str) -> Result<Url, TransferError> {
        let base = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{account}.blob.core.windows.net"),
        };
        Url::parse(&format!("{base}/{container}/{blob}")).map_err(|e| TransferError::Transfer {
            blob: blob.to_string(),
            message: format!("invalid blob URL: {e}"),
        })
    }

    async fn put_blob(
        &self,
        credential: &SharedKeyCredential,
        url: &Url,
        blob: &str,
        body: Vec<u8>,
    ) -> Result<(), TransferError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        self.send(credential, url.clone(), headers, body, blob).await
    }

    #[allow(clippy::too_many_arguments, reason = "block coordinates are all required")]
    async fn put_block(
        &self,
        credential: &SharedKeyCredential,
        url: &Url,
        blob: &str,
        local_path: &Path,
        block_id: &str,
        offset: u64,
        len: usize,
    ) -> Result<(), TransferError> {
        let body = read_block(local_path, offset, len).await?;

        let mut block_url = url.clone();
        block_url
            .query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", block_id);

        debug!(blob, block_id, offset, len, "Uploading block");
        self.send(credential, block_url, HeaderMap::new(), body, blob)
            .await
    }

    async fn put_block_list(
        &self,
        credential: &SharedKeyCredential,
        url: &Url,
        blob: &str,
        block_ids: &[String],
    ) -> Result<(), TransferError> {
        let mut list_url = url.clone();
        list_url.query_pairs_mut().append_pair("comp", "blocklist");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        headers.insert(
            "x-ms-blob-content-type",
            HeaderValue::from_static("application/octet-stream"),
        );

        self.send(credential, list_url, headers, block_list_xml(block_ids).into_bytes(), blob)
            .await
    }

    /// Sign and send a PUT, mapping the response onto [`TransferError`]
    async fn send(
        &self,
        credential: &SharedKeyCredential,
        url: Url,
        mut headers: HeaderMap,
        body: Vec<u8>,
        blob: &str,
    ) -> Result<(), TransferError> {
        let transfer_error = |message: String| TransferError::Transfer {
            blob: blob.to_string(),
            message,
        };

        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        headers.insert(
            "x-ms-date",
            HeaderValue::from_str(&date).map_err(|e| transfer_error(e.to_string()))?,
        );
        headers.insert(
            "x-ms-version",
            HeaderValue::from_static(AZURE_STORAGE_API_VERSION),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

        let authorization = credential.authorization(&Method::PUT, &url, &headers)?;
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization).map_err(|e| transfer_error(e.to_string()))?,
        );

        let response = self
            .http_client
            .put(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| transfer_error(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error_code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let body = response.text().await.unwrap_or_default();
        let message = format!("HTTP {status} ({error_code}): {body}");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(TransferError::Auth {
                account: credential.account().to_string(),
                message,
            })
        } else {
            Err(transfer_error(message))
        }
    }
}

#[async_trait]
impl ArtifactStore for AzureBlobStore {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadReceipt, TransferError> {
        let credential = SharedKeyCredential::new(&request.account, &request.account_key)?;
        let url = self.blob_url(&request.account, &request.container, &request.blob_name)?;
        let path = request.local_path.as_path();

        let size = tokio::fs::metadata(path)
            .await
            .map_err(|source| local_file_error(path, source))?
            .len();
        let block_size = self.block_size as u64;

        if size <= block_size {
            let body = tokio::fs::read(path)
                .await
                .map_err(|source| local_file_error(path, source))?;
            self.put_blob(&credential, &url, &request.blob_name, body)
                .await?;

            info!(blob = %url, bytes = size, "Uploaded artifact with a single Put Blob");
            return Ok(UploadReceipt {
                url: url.to_string(),
                bytes: size,
                blocks: 1,
            });
        }

        let block_count = usize::try_from(size.div_ceil(block_size)).map_err(|e| {
            TransferError::Transfer {
                blob: request.blob_name.clone(),
                message: format!("too many blocks: {e}"),
            }
        })?;
        let block_ids: Vec<String> = (0..block_count).map(block_id).collect();

        let mut uploads: Vec<BoxFuture<'_, Result<(), TransferError>>> =
            Vec::with_capacity(block_count);
        for (index, id) in block_ids.iter().enumerate() {
            let offset = index as u64 * block_size;
            // Last block may be short; each block is at most block_size so this fits usize
            let len = usize::try_from(block_size.min(size - offset)).unwrap_or(self.block_size);
            uploads.push(
                self.put_block(&credential, &url, &request.blob_name, path, id, offset, len)
                    .boxed(),
            );
        }

        futures::stream::iter(uploads)
            .buffer_unordered(self.parallelism)
            .try_collect::<Vec<()>>()
            .await?;

        self.put_block_list(&credential, &url, &request.blob_name, &block_ids)
            .await?;

        info!(
            blob = %url,
            bytes = size,
            blocks = block_count,
            parallelism = self.parallelism,
            "Uploaded artifact in blocks"
        );
        Ok(UploadReceipt {
            url: url.to_string(),
            bytes: size,
            blocks: block_count,
        })
    }
}

fn local_file_error(path: &Path, source: std::io::Error) -> TransferError {
    TransferError::LocalFile {
        path: path.display().to_string(),
        source,
    }
}

async fn read_block(path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, TransferError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| local_file_error(path, source))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|source| local_file_error(path, source))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)
        .await
        .map_err(|source| local_file_error(path, source))?;
    Ok(buf)
}

/// Block IDs must be base64 and all the same length within a blob
fn block_id(index: usize) -> String {
    STANDARD.encode(format!("block-{index:08}"))
}

fn block_list_xml(block_ids: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(id);
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}
