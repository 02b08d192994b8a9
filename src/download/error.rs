//! Error types for the download module.
//!
//! Every variant carries the URL or path it concerns so a failure record can be
//! written without extra context.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching, writing or validating one file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request or body read timed out.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The connection failed while the body was being read.
    #[error("stream error downloading {url}: {source}")]
    Stream {
        /// The URL whose body was cut short.
        url: String,
        /// The underlying read error.
        #[source]
        source: std::io::Error,
    },

    /// File system error during download (create file, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The file on disk failed structural validation for its extension.
    #[error("validation failed for {path}: {reason}")]
    Validation {
        /// The rejected file (already removed).
        path: PathBuf,
        /// What check failed.
        reason: String,
    },

    /// Neither the declared content type nor the leading bytes identified the file.
    #[error("unrecognized file type for {url}")]
    UnresolvedType {
        /// The URL whose body could not be typed.
        url: String,
    },

    /// Another job in the same batch already targets this URL.
    #[error("duplicate URL in batch: {url}")]
    DuplicateUrl {
        /// The repeated URL.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a body stream error; read timeouts become [`DownloadError::Timeout`].
    pub fn stream(url: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::TimedOut {
            return Self::timeout(url);
        }
        Self::Stream {
            url: url.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a structural validation error.
    pub fn validation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unresolved file type error.
    pub fn unresolved_type(url: impl Into<String>) -> Self {
        Self::UnresolvedType { url: url.into() }
    }

    /// Creates a duplicate URL error.
    pub fn duplicate_url(url: impl Into<String>) -> Self {
        Self::DuplicateUrl { url: url.into() }
    }
}

// No `From<reqwest::Error>` or `From<std::io::Error>`: every variant needs the
// url or path, which the source errors don't carry. Use the constructors.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://example.com/file.pdf");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/file.pdf"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://example.com/file.pdf", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(
            msg.contains("https://example.com/file.pdf"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/test.pdf"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/test.pdf"), "Expected path in: {msg}");
    }

    #[test]
    fn test_download_error_validation_display() {
        let error = DownloadError::validation("/tmp/a.pdf", "missing %PDF signature");
        let msg = error.to_string();
        assert!(msg.contains("/tmp/a.pdf"), "Expected path in: {msg}");
        assert!(msg.contains("%PDF"), "Expected reason in: {msg}");
    }

    #[test]
    fn test_download_error_invalid_url_display() {
        let error = DownloadError::invalid_url("not-a-url");
        let msg = error.to_string();
        assert!(
            msg.contains("invalid URL"),
            "Expected 'invalid URL' in: {msg}"
        );
        assert!(msg.contains("not-a-url"), "Expected URL in: {msg}");
    }
}
