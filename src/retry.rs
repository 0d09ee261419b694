//! Bounded polling used while waiting for a remote device to come up.
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The probe succeeded on the given (1-based) attempt.
    Ready { attempt: u32 },
    /// Every attempt was used up without success.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct BoundedRetry {
    max_attempts: u32,
    interval: Duration,
}

impl BoundedRetry {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Run `probe` until it returns `true` or attempts run out,
    /// sleeping `interval` between attempts.
    pub async fn poll<F, Fut>(&self, label: &str, mut probe: F) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = bool>,
    {
        for attempt in 1..=self.max_attempts {
            if probe(attempt).await {
                tracing::debug!(label, attempt, "probe ready");
                return RetryOutcome::Ready { attempt };
            }
            if attempt < self.max_attempts {
                tracing::trace!(label, attempt, "probe not ready, retrying");
                tokio::time::sleep(self.interval).await;
            }
        }
        tracing::warn!(label, attempts = self.max_attempts, "probe exhausted");
        RetryOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ready_on_third_attempt() {
        let start = tokio::time::Instant::now();
        let outcome = BoundedRetry::new(5, Duration::from_secs(2))
            .poll("test", |attempt| async move { attempt == 3 })
            .await;
        assert_eq!(outcome, RetryOutcome::Ready { attempt: 3 });
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_without_trailing_sleep() {
        let start = tokio::time::Instant::now();
        let mut calls = 0;
        let outcome = BoundedRetry::new(60, Duration::from_secs(2))
            .poll("test", |_| {
                calls += 1;
                async { false }
            })
            .await;
        assert_eq!(outcome, RetryOutcome::Exhausted { attempts: 60 });
        assert_eq!(calls, 60);
        assert_eq!(start.elapsed(), Duration::from_secs(118));
    }
}
