use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::warn;

/// Fixed number of attempts with a fixed pause between them.
///
/// Every error is retryable; the error from the last attempt is returned as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// `attempts` is the total number of calls, clamped to at least one.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts: attempts.max(1), delay }
    }

    pub async fn run<A, Fut, T, E>(&self, label: &str, mut action: A) -> Result<T, E>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let strategy = FixedInterval::new(self.delay).take(self.attempts as usize - 1);
        let total = self.attempts;
        let mut attempt = 0u32;

        Retry::spawn(strategy, || {
            attempt += 1;
            let n = attempt;
            let fut = action();
            async move {
                fut.await.inspect_err(|e| {
                    warn!("{} failed (attempt {}/{}): {}", label, n, total, e);
                })
            }
        })
        .await
    }
}
