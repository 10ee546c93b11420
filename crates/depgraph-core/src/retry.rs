use std::future::Future;
use std::time::Duration;

use crate::error::DepGraphError;

/// Configuration for `with_retry`. Defaults match spec §7:
/// `{maxAttempts: 3, baseDelayMs: 1000, multiplier: 2, maxDelayMs: 30_000, jitter: 0.1}`.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Additive uniform jitter fraction: delay is adjusted by
    /// `[-jitter * delay, +jitter * delay]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Delay before the given attempt number (1-indexed: delay before
    /// attempt 2 uses `base_delay_ms`, attempt 3 uses `base_delay_ms * multiplier`, ...).
    /// `jitter_sample` is a caller-supplied value in `[-1.0, 1.0]` so the
    /// computation stays deterministic and testable; production callers pass
    /// a value drawn from an RNG.
    pub fn delay_for_attempt(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let raw = (self.base_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        let jittered = raw + raw * self.jitter * jitter_sample.clamp(-1.0, 1.0);
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

/// Retry an async operation per `RetryConfig`, calling `retry_if` to decide
/// whether a given error is worth retrying and `on_retry` as an observation
/// hook (e.g. `tracing::warn!`) before each backoff sleep.
pub async fn with_retry<T, F, Fut>(
    config: RetryConfig,
    mut op: F,
    retry_if: impl Fn(&DepGraphError) -> bool,
    mut on_retry: impl FnMut(u32, &DepGraphError, Duration),
) -> Result<T, DepGraphError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DepGraphError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.max_attempts && retry_if(&err) => {
                let delay = config.delay_for_attempt(attempt, jitter_sample());
                on_retry(attempt, &err, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn jitter_sample() -> f64 {
    // A cheap, dependency-free pseudo-random sample seeded from the clock;
    // jitter only needs to avoid thundering-herd synchronization, not
    // cryptographic quality.
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().subsec_nanos();
    ((nanos % 2001) as f64 / 1000.0) - 1.0
}

/// Race an operation against a deadline, mapping an elapsed deadline onto
/// `DepGraphError::Timeout`.
pub async fn with_timeout<T, Fut>(timeout_ms: u64, fut: Fut) -> Result<T, DepGraphError>
where
    Fut: Future<Output = Result<T, DepGraphError>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(DepGraphError::Timeout { timeout_ms }),
    }
}

/// Evaluate `primary`; if it fails and `should_fallback` accepts the error,
/// evaluate `fallback` instead.
pub async fn with_fallback<T, F1, F2>(
    primary: F1,
    should_fallback: impl Fn(&DepGraphError) -> bool,
    fallback: F2,
) -> Result<T, DepGraphError>
where
    F1: Future<Output = Result<T, DepGraphError>>,
    F2: Future<Output = Result<T, DepGraphError>>,
{
    match primary.await {
        Ok(value) => Ok(value),
        Err(err) if should_fallback(&err) => fallback.await,
        Err(err) => Err(err),
    }
}
