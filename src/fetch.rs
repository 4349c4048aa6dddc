//! HTTP retrieval of subscription sources.
//!
//! Conditional GET against the stored `ETag`/`Last-Modified`, retry with
//! exponential backoff on 429 and 5xx, a hard body size limit, and SSRF checks
//! before any request is sent.

use futures::StreamExt;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::model::{FetchErrorKind, UpdateState};
use crate::util::{validate_source_url, UrlValidationError};

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while downloading a source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Source rejected before any request was made
    #[error("Invalid source: {0}")]
    InvalidSource(#[from] UrlValidationError),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::HttpStatus(401 | 403) => FetchErrorKind::Auth,
            _ => FetchErrorKind::Net,
        }
    }
}

/// A completed download.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub data: Vec<u8>,
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Server answered 304; `data` is empty and the feed is unchanged
    pub not_modified: bool,
}

impl FetchResult {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Fetch tuning.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_bytes: usize,
    /// First backoff delay; doubles per retry
    pub retry_delay: Duration,
    /// Skip SSRF checks (local testing only)
    pub allow_private_hosts: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: MAX_FEED_SIZE,
            retry_delay: Duration::from_secs(2),
            allow_private_hosts: false,
        }
    }
}

/// Builds the shared HTTP client.
pub fn build_client(user_agent: &str) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

/// Downloads `source`, sending conditional headers from `state`.
///
/// # Errors
///
/// - [`FetchError::InvalidSource`] - URL failed validation, nothing was sent
/// - [`FetchError::Network`] / [`FetchError::Timeout`] - transport failures
/// - [`FetchError::HttpStatus`] - non-2xx response (5xx after retries)
/// - [`FetchError::RateLimited`] - 429 after max retries
/// - [`FetchError::ResponseTooLarge`] - body exceeded `max_bytes`
pub async fn fetch_source(
    client: &reqwest::Client,
    source: &str,
    state: &UpdateState,
    options: &FetchOptions,
) -> Result<FetchResult, FetchError> {
    let url = validate_source_url(source, options.allow_private_hosts)?;
    let mut retry_count = 0;

    loop {
        let mut request = client.get(url.as_str());
        if let Some(etag) = &state.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(modified) = &state.last_modified {
            request = request.header(IF_MODIFIED_SINCE, modified);
        }

        let response = tokio::time::timeout(options.timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!(source = %source, "Not modified since last poll");
            return Ok(FetchResult {
                status: status.as_u16(),
                etag: state.etag.clone(),
                last_modified: state.last_modified.clone(),
                not_modified: true,
                ..FetchResult::default()
            });
        }

        // EDGE-004: Rate limiting and server errors back off exponentially
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            if retry_count >= MAX_RETRIES {
                return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                    FetchError::RateLimited(MAX_RETRIES)
                } else {
                    FetchError::HttpStatus(status.as_u16())
                });
            }

            let delay = options.retry_delay * 2u32.pow(retry_count);
            tracing::warn!(
                source = %source,
                status = %status,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Retrying after delay"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let etag = header_value(&response, ETAG);
        let last_modified = header_value(&response, LAST_MODIFIED);

        match read_limited_bytes(response, options.max_bytes).await {
            Ok(data) => {
                return Ok(FetchResult {
                    data,
                    status: status.as_u16(),
                    etag,
                    last_modified,
                    not_modified: false,
                })
            }
            Err(FetchError::IncompleteResponse { expected, received })
                if retry_count < MAX_RETRIES =>
            {
                // EDGE-005: interrupted downloads are retried
                let delay = options.retry_delay * 2u32.pow(retry_count);
                tracing::debug!(
                    source = %source,
                    expected,
                    received,
                    attempt = retry_count + 1,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
