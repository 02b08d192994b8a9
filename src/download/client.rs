//! Blocking HTTP client used by the download workers.
//!
//! The engine talks to the network only through the [`Fetch`] trait so tests
//! and alternative transports can stand in for [`HttpClient`].

use std::fmt;
use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT};
use super::error::DownloadError;
use crate::user_agent;

/// An open response whose body has not been read yet.
pub struct FetchResponse {
    /// Declared `Content-Type`, if the server sent one.
    pub content_type: Option<String>,
    /// Declared `Content-Length`, if the server sent one.
    pub content_length: Option<u64>,
    /// The body, read incrementally by the caller.
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Streamed GET of a URL.
///
/// Implementations return `Err` for transport failures and for any non-2xx
/// status; an `Ok` response always carries a success status.
pub trait Fetch: Send + Sync + fmt::Debug {
    /// Sends the request and returns once headers are received.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for invalid URLs, network failures, timeouts
    /// and error statuses.
    fn open(&self, url: &str) -> Result<FetchResponse, DownloadError>;
}

/// HTTP client settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Whole-request timeout, per attempt.
    pub timeout: Duration,
    /// Whether TLS certificates are verified.
    pub verify_tls: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            verify_tls: true,
        }
    }
}

/// [`Fetch`] over a pooled `reqwest` blocking client.
///
/// Create once and share across workers; the client is `Send + Sync`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client with the given timeout and TLS verification.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` builder error if the TLS backend cannot be set up.
    #[instrument(level = "debug")]
    pub fn new(options: ClientOptions) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/pdf,application/octet-stream,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(user_agent::ACCEPT_LANGUAGE),
        );

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(options.timeout))
            .timeout(options.timeout)
            .gzip(true)
            .user_agent(user_agent::BROWSER_USER_AGENT)
            .default_headers(headers)
            .danger_accept_invalid_certs(!options.verify_tls)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpClient {
    #[instrument(skip(self), fields(url = %url))]
    fn open(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "error status");
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = response.content_length();
        debug!(?content_type, ?content_length, "response headers received");

        Ok(FetchResponse {
            content_type,
            content_length,
            body: Box::new(response),
        })
    }
}
