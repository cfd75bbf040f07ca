//! Transfer service seam.
//!
//! The orchestrator hands each media item to a [`TransferService`]. The
//! content fetch is tried first; when it fails the orchestrator calls
//! [`TransferService::open_direct`] exactly once before giving up on the item.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use super::client::HttpClient;
use super::error::DownloadError;
use crate::user_agent::BROWSER_USER_AGENT;

/// What to do when the suggested filename already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep both files; the new one gets a numbered name.
    #[default]
    Uniquify,
}

/// One resource to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub filename: String,
    pub conflict: ConflictPolicy,
}

impl TransferRequest {
    #[must_use]
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            conflict: ConflictPolicy::Uniquify,
        }
    }
}

/// Identifier handed back by the service for a confirmed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub u64);

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Confirmation of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub id: TransferId,
    /// Where the resource landed, when the service writes to disk.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The service declined the request without attempting it.
    #[error("transfer rejected for {url}: {reason}")]
    Rejected { url: String, reason: String },
}

impl TransferError {
    pub fn rejected(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Accepts a URL plus a suggested name and confirms or fails the transfer.
#[async_trait]
pub trait TransferService: Send + Sync {
    /// Content fetch of the resource.
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError>;

    /// Direct-link fallback: open the resource link itself with the
    /// suggested name.
    async fn open_direct(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, TransferError>;
}

/// Transfer ids start at the process start time in microseconds and count up
/// from there, so ids from an earlier run on the same settings store are
/// never reissued.
static NEXT_TRANSFER_ID: LazyLock<AtomicU64> = LazyLock::new(|| {
    let seed = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
    AtomicU64::new(seed.max(1))
});

/// [`TransferService`] writing into a local directory over HTTP.
#[derive(Debug)]
pub struct HttpTransferService {
    client: HttpClient,
    output_dir: PathBuf,
}

impl HttpTransferService {
    #[must_use]
    pub fn new(client: HttpClient, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            output_dir: output_dir.into(),
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn issue_id(&self) -> TransferId {
        TransferId(NEXT_TRANSFER_ID.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl TransferService for HttpTransferService {
    #[instrument(skip(self, request), fields(url = %request.url, filename = %request.filename))]
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError> {
        let result = self
            .client
            .download_to_file(&request.url, &self.output_dir, &request.filename)
            .await?;
        let id = self.issue_id();
        debug!(%id, path = %result.path.display(), "transfer confirmed");
        Ok(TransferReceipt {
            id,
            path: Some(result.path),
        })
    }

    #[instrument(skip(self, request), fields(url = %request.url, filename = %request.filename))]
    async fn open_direct(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, TransferError> {
        let result = self
            .client
            .open_direct(
                &request.url,
                &self.output_dir,
                &request.filename,
                BROWSER_USER_AGENT,
            )
            .await?;
        let id = self.issue_id();
        debug!(%id, path = %result.path.display(), "direct transfer confirmed");
        Ok(TransferReceipt {
            id,
            path: Some(result.path),
        })
    }
}
