//! HTTP client wrapper for fetching media to disk.
//!
//! Content fetches stream the body into the output directory under a
//! caller-chosen name. The direct-link path re-requests with a browser
//! User-Agent and writes a buffered body, which is what the fallback uses.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::filename::resolve_unique_path;
use crate::user_agent;

/// HTTP client for media downloads.
///
/// Create once and reuse; the inner client pools connections.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Outcome of one fetch.
#[derive(Debug, Clone)]
pub struct DownloadFileResult {
    /// Final output path after conflict resolution.
    pub path: PathBuf,
    pub bytes_downloaded: u64,
}

impl HttpClient {
    /// Creates a client with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeouts in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the builder fails.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;
        Ok(Self { client })
    }

    /// Streams `url` into `output_dir/filename`, uniquifying on conflict.
    ///
    /// A partially written file is removed when the stream fails.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the URL is invalid, the request fails, the
    /// server answers with a non-success status, or writing fails.
    #[instrument(skip(self, output_dir), fields(url = %url, filename = %filename))]
    pub async fn download_to_file(
        &self,
        url: &str,
        output_dir: &Path,
        filename: &str,
    ) -> Result<DownloadFileResult, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let response = self.send_request(url, None).await?;

        ensure_dir(output_dir).await?;
        let file_path = resolve_unique_path(output_dir, filename);
        debug!(path = %file_path.display(), "resolved output path");

        let mut file = File::create(&file_path)
            .await
            .map_err(|e| DownloadError::io(file_path.clone(), e))?;
        let stream_result = stream_to_file(&mut file, response, url, &file_path).await;
        if stream_result.is_err() {
            debug!(path = %file_path.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(&file_path).await;
        }
        let bytes_downloaded = stream_result?;

        info!(path = %file_path.display(), bytes = bytes_downloaded, "download complete");
        Ok(DownloadFileResult {
            path: file_path,
            bytes_downloaded,
        })
    }

    /// Opens `url` directly with the given User-Agent and saves the buffered
    /// body under `filename`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`HttpClient::download_to_file`].
    #[instrument(skip(self, output_dir, user_agent), fields(url = %url, filename = %filename))]
    pub async fn open_direct(
        &self,
        url: &str,
        output_dir: &Path,
        filename: &str,
        user_agent: &str,
    ) -> Result<DownloadFileResult, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let response = self.send_request(url, Some(user_agent)).await?;
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        ensure_dir(output_dir).await?;
        let file_path = resolve_unique_path(output_dir, filename);
        tokio::fs::write(&file_path, &body)
            .await
            .map_err(|e| DownloadError::io(file_path.clone(), e))?;

        info!(path = %file_path.display(), bytes = body.len(), "direct download complete");
        Ok(DownloadFileResult {
            path: file_path,
            bytes_downloaded: body.len() as u64,
        })
    }

    async fn send_request(
        &self,
        url: &str,
        user_agent: Option<&str>,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut request = self.client.get(url);
        if let Some(ua) = user_agent {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            if matches!(status_code, 401 | 403) {
                return Err(DownloadError::access_denied(url, status_code));
            }
            return Err(DownloadError::http_status(url, status_code));
        }
        Ok(response)
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), DownloadError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DownloadError::io(dir.to_path_buf(), e))
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}
