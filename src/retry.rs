use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng as _;
use tracing::warn;

/// Exponential backoff with full jitter.
///
/// The delay after the n-th failed attempt (counting from zero) is drawn uniformly from
/// `[0, base * 2^n)` and capped at `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            max: Duration::from_secs(20),
        }
    }
}

impl Backoff {
    /// Randomized delay to wait after a failed `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = 2u32
            .checked_pow(attempt)
            .map_or(Duration::MAX, |factor| self.base.saturating_mul(factor));

        let ceiling = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);
        if ceiling == 0 {
            return Duration::ZERO;
        }

        let jitter = Duration::from_nanos(rand::thread_rng().gen_range(0..ceiling));
        jitter.min(self.max)
    }

    /// Run `op` until it succeeds or runs out of attempts, returning the last error.
    ///
    /// `op` is given the attempt number (starting from zero).
    pub async fn retry<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= self.max_attempts.max(1) => return Err(e),
                Err(e) => {
                    let delay = self.delay(attempt);
                    warn!(attempt, ?delay, error = %e, "attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
