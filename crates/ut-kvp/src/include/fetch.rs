//! Retrieval of remote include targets.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while fetching a remote include.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be built or sent, or the body could not be read.
    #[error("request to '{url}' failed: {source}")]
    Request {
        /// Target URL.
        url: String,
        /// Client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("'{url}' answered with HTTP status {status}")]
    Status {
        /// Target URL.
        url: String,
        /// Status code received.
        status: u16,
    },

    /// The fetcher does not handle this scheme.
    #[error("scheme '{scheme}' is not supported for includes")]
    UnsupportedScheme {
        /// Scheme of the rejected URL.
        scheme: String,
    },
}

impl FetchError {
    fn request(url: &Url, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_string(),
            source,
        }
    }
}

/// Fetches the bytes behind an include URL.
///
/// The default implementation is [`HttpFetcher`]; tests and embedders can
/// substitute their own through [`crate::Document::with_fetcher`].
pub trait IncludeFetcher: Send + Sync + fmt::Debug {
    /// Returns the body stored at `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the body cannot be retrieved.
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP(S) fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }
}

impl IncludeFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme {
                scheme: url.scheme().to_owned(),
            });
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|source| FetchError::request(url, source))?;
        let response = client
            .get(url.clone())
            .send()
            .map_err(|source| FetchError::request(url, source))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .map_err(|source| FetchError::request(url, source))?;
        Ok(body.to_vec())
    }
}
