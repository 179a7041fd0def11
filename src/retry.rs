use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng as _;

/// How long to wait before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^retry` plus jitter, used for throttling and transport failures.
    Exponential,
    /// `step * (retry + 1)` plus jitter, used for ordinary non-success responses.
    Linear,
    /// The server told us how long to wait (`Retry-After`).
    After(Duration),
}

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry(Backoff),
    Abort,
}

/// Backoff configuration with jitter so request cadence never settles into
/// a fixed rhythm an upstream bot filter could fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub linear_step: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            base_delay: Duration::from_secs(2),
            linear_step: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
        }
    }
}

/// Uniform random jitter in `[0, span)`, zero when `span` is zero.
fn jitter_below(span: Duration) -> Duration {
    let span_ms = u64::try_from(span.as_millis()).unwrap_or(u64::MAX);
    if span_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..span_ms))
}

impl RetryConfig {
    /// Compute the delay for a given retry (0-indexed).
    ///
    /// Exponential: `min(base * 2^retry + jitter(0..base), max)`. Since the
    /// jitter never reaches `base`, consecutive delays never decrease.
    pub fn delay_for_retry(&self, backoff: Backoff, retry: u32) -> Duration {
        let raw = match backoff {
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
                self.base_delay
                    .checked_mul(factor)
                    .unwrap_or(Duration::MAX)
                    .saturating_add(jitter_below(self.base_delay))
            }
            Backoff::Linear => self
                .linear_step
                .checked_mul(retry.saturating_add(1))
                .unwrap_or(Duration::MAX)
                .saturating_add(jitter_below(self.linear_step)),
            Backoff::After(wait) => wait,
        };
        raw.min(self.max_delay)
    }
}

/// An inclusive `[min, max]` window for randomized pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterWindow {
    pub min: Duration,
    pub max: Duration,
}

impl JitterWindow {
    pub fn new(min: Duration, max: Duration) -> anyhow::Result<Self> {
        if min > max {
            anyhow::bail!(
                "Jitter window minimum ({}ms) exceeds maximum ({}ms)",
                min.as_millis(),
                max.as_millis()
            );
        }
        Ok(Self { min, max })
    }

    pub fn sample(&self) -> Duration {
        let lo = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let hi = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        if lo >= hi {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

/// Every wait in the sync pipeline goes through this so tests can observe
/// delays instead of sitting through them.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Retry an async operation, letting the classifier pick the backoff shape.
///
/// Returns the first `Ok` result, or the last error if attempts are
/// exhausted or the classifier returns `Abort`.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };
        let backoff = match classifier(&err) {
            RetryAction::Abort => return Err(err),
            RetryAction::Retry(backoff) => backoff,
        };
        attempt += 1;
        if attempt >= total_attempts {
            return Err(err);
        }
        let delay = config.delay_for_retry(backoff, attempt - 1);
        tracing::warn!(
            "Retryable error (attempt {}/{}), retrying in {:.1}s: {}",
            attempt,
            total_attempts,
            delay.as_secs_f64(),
            err
        );
        sleeper.sleep(delay).await;
    }
}

/// Sleeper that records requested delays and returns immediately.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSleeper {
    slept: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingSleeper {
    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn instant_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::ZERO,
            linear_step: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.base_delay, secs(2));
        assert_eq!(config.linear_step, secs(1));
        assert_eq!(config.max_delay, secs(120));
    }

    #[test]
    fn test_delay_exponential_backoff() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: secs(2),
            linear_step: secs(1),
            max_delay: secs(60),
        };
        // retry 0: 2*1=2, jitter in 0..2, total in [2, 4)
        let d = config.delay_for_retry(Backoff::Exponential, 0);
        assert!(d >= secs(2) && d < secs(4));

        // retry 1: 2*2=4, total in [4, 6)
        let d = config.delay_for_retry(Backoff::Exponential, 1);
        assert!(d >= secs(4) && d < secs(6));

        // retry 2: 2*4=8, total in [8, 10)
        let d = config.delay_for_retry(Backoff::Exponential, 2);
        assert!(d >= secs(8) && d < secs(10));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: secs(5),
            linear_step: secs(1),
            max_delay: secs(30),
        };
        assert_eq!(config.delay_for_retry(Backoff::Exponential, 10), secs(30));
        assert_eq!(config.delay_for_retry(Backoff::Exponential, 200), secs(30));
        assert_eq!(config.delay_for_retry(Backoff::Linear, 500), secs(30));
    }

    #[test]
    fn test_delay_linear() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: secs(2),
            linear_step: secs(1),
            max_delay: secs(120),
        };
        let d = config.delay_for_retry(Backoff::Linear, 0);
        assert!(d >= secs(1) && d < secs(2));
        let d = config.delay_for_retry(Backoff::Linear, 3);
        assert!(d >= secs(4) && d < secs(5));
    }

    #[test]
    fn test_server_directed_delay_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(
            config.delay_for_retry(Backoff::After(secs(9)), 0),
            secs(9)
        );
        assert_eq!(
            config.delay_for_retry(Backoff::After(secs(3600)), 0),
            secs(120)
        );
    }

    #[test]
    fn test_exponential_delays_never_decrease() {
        let config = RetryConfig {
            max_attempts: 12,
            base_delay: Duration::from_millis(1500),
            linear_step: secs(1),
            max_delay: secs(120),
        };
        for _ in 0..50 {
            let delays: Vec<Duration> = (0..12)
                .map(|r| config.delay_for_retry(Backoff::Exponential, r))
                .collect();
            assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
            assert!(delays.iter().all(|d| *d <= secs(120)));
        }
    }

    #[test]
    fn test_delay_zero_base() {
        let config = instant_config(3);
        assert_eq!(
            config.delay_for_retry(Backoff::Exponential, 0),
            Duration::ZERO
        );
    }

    #[test]
    fn test_jitter_window_rejects_inverted_bounds() {
        assert!(JitterWindow::new(secs(3), secs(1)).is_err());
    }

    #[test]
    fn test_jitter_window_sample_in_range() {
        let window = JitterWindow::new(Duration::from_millis(100), Duration::from_millis(250))
            .unwrap();
        for _ in 0..100 {
            let d = window.sample();
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_jitter_window_degenerate() {
        let window = JitterWindow::new(secs(1), secs(1)).unwrap();
        assert_eq!(window.sample(), secs(1));
    }

    #[test]
    fn test_jitter_window_beyond_u64_millis() {
        let window =
            JitterWindow::new(Duration::from_secs(u64::MAX / 1000 + 1), Duration::MAX).unwrap();
        let sampled = window.sample();
        assert!(sampled >= window.min);
        assert!(sampled <= window.max);
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let sleeper = RecordingSleeper::default();
        let result: Result<i32, String> = retry_with_backoff(
            &instant_config(3),
            &sleeper,
            |_| RetryAction::Retry(Backoff::Exponential),
            || async { Ok(42) },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_retry_abort_on_non_retryable() {
        let sleeper = RecordingSleeper::default();
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let result: Result<i32, String> = retry_with_backoff(
            &instant_config(3),
            &sleeper,
            |_| RetryAction::Abort,
            || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "fatal");
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let sleeper = RecordingSleeper::default();
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let result: Result<i32, String> = retry_with_backoff(
            &instant_config(4),
            &sleeper,
            |_| RetryAction::Retry(Backoff::Linear),
            || {
                let cc = cc.clone();
                async move {
                    let n = cc.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(99)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let sleeper = RecordingSleeper::default();
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let result: Result<i32, String> = retry_with_backoff(
            &instant_config(3),
            &sleeper,
            |_| RetryAction::Retry(Backoff::Exponential),
            || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("still failing".to_string())
                }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "still failing");
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        // no sleep after the final attempt
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_honors_server_delay() {
        let sleeper = RecordingSleeper::default();
        let config = RetryConfig {
            max_attempts: 2,
            ..RetryConfig::default()
        };
        let _: Result<(), String> = retry_with_backoff(
            &config,
            &sleeper,
            |_| RetryAction::Retry(Backoff::After(secs(17))),
            || async { Err("slow down".to_string()) },
        )
        .await;
        assert_eq!(sleeper.delays(), vec![secs(17)]);
    }
}
