use std::time::Duration;

use thiserror::Error;

use super::transport::TransportError;
use crate::retry::{Backoff, RetryAction};

/// Typed upstream failures enabling backoff classification.
///
/// `retry_action()` maps each failure to the backoff shape the fetcher
/// should use: throttling and transport failures back off exponentially
/// (or as the server directs), ordinary bad responses back off linearly.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("throttled (HTTP {status}): {reason}")]
    Throttled {
        status: u16,
        retry_after: Option<Duration>,
        reason: &'static str,
    },

    #[error("HTTP error {status}")]
    HttpStatus { status: u16 },

    #[error("empty response body")]
    EmptyBody,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FetchError {
    pub fn is_throttle(&self) -> bool {
        matches!(self, FetchError::Throttled { .. })
    }

    pub fn retry_action(&self) -> RetryAction {
        match self {
            FetchError::Throttled {
                retry_after: Some(wait),
                ..
            } => RetryAction::Retry(Backoff::After(*wait)),
            FetchError::Throttled { .. } => RetryAction::Retry(Backoff::Exponential),
            FetchError::HttpStatus { .. } | FetchError::EmptyBody => {
                RetryAction::Retry(Backoff::Linear)
            }
            FetchError::Transport(e) if e.retryable => RetryAction::Retry(Backoff::Exponential),
            FetchError::Transport(_) => RetryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttled(retry_after: Option<Duration>) -> FetchError {
        FetchError::Throttled {
            status: 429,
            retry_after,
            reason: "rate limited",
        }
    }

    #[test]
    fn test_throttle_backs_off_exponentially() {
        assert_eq!(
            throttled(None).retry_action(),
            RetryAction::Retry(Backoff::Exponential)
        );
        assert!(throttled(None).is_throttle());
    }

    #[test]
    fn test_throttle_honors_retry_after() {
        let wait = Duration::from_secs(42);
        assert_eq!(
            throttled(Some(wait)).retry_action(),
            RetryAction::Retry(Backoff::After(wait))
        );
    }

    #[test]
    fn test_http_404_backs_off_linearly() {
        let e = FetchError::HttpStatus { status: 404 };
        assert_eq!(e.retry_action(), RetryAction::Retry(Backoff::Linear));
        assert!(!e.is_throttle());
    }

    #[test]
    fn test_empty_body_backs_off_linearly() {
        assert_eq!(
            FetchError::EmptyBody.retry_action(),
            RetryAction::Retry(Backoff::Linear)
        );
    }

    #[test]
    fn test_transport_timeout_retryable() {
        let e = FetchError::Transport(TransportError {
            message: "timeout".into(),
            retryable: true,
        });
        assert_eq!(e.retry_action(), RetryAction::Retry(Backoff::Exponential));
    }

    #[test]
    fn test_malformed_request_aborts() {
        let e = FetchError::Transport(TransportError {
            message: "builder error".into(),
            retryable: false,
        });
        assert_eq!(e.retry_action(), RetryAction::Abort);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            throttled(None).to_string(),
            "throttled (HTTP 429): rate limited"
        );
        assert_eq!(
            FetchError::HttpStatus { status: 500 }.to_string(),
            "HTTP error 500"
        );
    }
}
