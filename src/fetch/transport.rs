use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER, USER_AGENT};
use reqwest::Client;
use thiserror::Error;

/// What the fetcher needs from one upstream GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

/// Request never produced a usable response (timeout, DNS, reset, ...).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// False when retrying cannot help, e.g. the URL itself is malformed.
    pub retryable: bool,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection error"
        } else {
            "request error"
        };
        Self {
            retryable: !e.is_builder(),
            message: format!("{}: {}", kind, e),
        }
    }
}

/// Minimal GET capability used by the fetcher.
/// The production implementation is `reqwest::Client`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<UpstreamResponse, TransportError>;
}

#[async_trait]
impl Transport for Client {
    async fn get(&self, url: &str) -> Result<UpstreamResponse, TransportError> {
        let resp = Client::get(self, url).send().await?;
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, chrono::Utc::now()));
        let body = resp.text().await?;
        Ok(UpstreamResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Parse a `Retry-After` value: either delta-seconds or an HTTP date.
/// Dates in the past mean "retry now".
pub(crate) fn parse_retry_after(
    value: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.with_timezone(&chrono::Utc) - now;
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

/// Build the keep-alive client shared by every upstream request.
pub fn build_client(user_agent: &str, timeout: Duration) -> anyhow::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/plain,text/*;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    let client = Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?;
    Ok(client)
}
