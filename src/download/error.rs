//! Error types for media transfers.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while fetching a media resource to disk.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timeout downloading {url}")]
    Timeout { url: String },

    /// Non-success status other than an access denial.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus { url: String, status: u16 },

    /// The CDN refused the request. Signed media links expire, so the usual
    /// cause is a stale page.
    #[error("access denied (HTTP {status}) downloading {url}\n  Suggestion: {suggestion}")]
    AccessDenied {
        url: String,
        status: u16,
        suggestion: &'static str,
    },

    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        #[source]
        source: reqwest::Error,
    },
}

impl DownloadError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an access-denied error for 401/403 responses.
    pub fn access_denied(url: impl Into<String>, status: u16) -> Self {
        Self::AccessDenied {
            url: url.into(),
            status,
            suggestion: "Reload the ad library page to refresh signed media links.",
        }
    }

    /// Returns true when a browser-style re-request may succeed.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://video.fbcdn.net/v.mp4");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://video.fbcdn.net/v.mp4"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://video.fbcdn.net/v.mp4", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(!error.is_access_denied());
    }

    #[test]
    fn test_download_error_access_denied_carries_suggestion() {
        let error = DownloadError::access_denied("https://scontent.fbcdn.net/a.jpg", 403);
        let msg = error.to_string();
        assert!(msg.contains("403"), "Expected status in: {msg}");
        assert!(msg.contains("Reload"), "Expected suggestion in: {msg}");
        assert!(error.is_access_denied());
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/acme.mp4"), io_error);
        assert!(error.to_string().contains("/tmp/acme.mp4"));
    }
}
