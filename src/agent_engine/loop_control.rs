//! Error recovery for the agent loop.
use std::time::Duration;

/// Decides how long the loop backs off after a failed iteration or reconnect.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    error_backoff: Duration,
    reconnect_backoff: Duration,
    consecutive_reconnect_failures: u32,
}

impl RecoveryPolicy {
    pub fn new(error_backoff: Duration, reconnect_backoff: Duration) -> Self {
        Self {
            error_backoff,
            reconnect_backoff,
            consecutive_reconnect_failures: 0,
        }
    }

    /// Pause after a failed iteration.
    pub fn error_backoff(&self) -> Duration {
        self.error_backoff
    }

    pub fn record_reconnect_success(&mut self) {
        self.consecutive_reconnect_failures = 0;
    }

    /// The first failure retries on the next iteration; later ones add the
    /// reconnect backoff.
    pub fn record_reconnect_failure(&mut self) -> Option<Duration> {
        self.consecutive_reconnect_failures += 1;
        (self.consecutive_reconnect_failures >= 2).then_some(self.reconnect_backoff)
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_backoff_ignores_reconnect_failures() {
        let mut policy = RecoveryPolicy::default();
        assert_eq!(policy.error_backoff(), Duration::from_secs(2));
        policy.record_reconnect_failure();
        policy.record_reconnect_failure();
        assert_eq!(policy.error_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn reconnect_backoff_from_second_failure() {
        let mut policy = RecoveryPolicy::default();
        assert_eq!(policy.record_reconnect_failure(), None);
        assert_eq!(policy.record_reconnect_failure(), Some(Duration::from_secs(5)));
        assert_eq!(policy.record_reconnect_failure(), Some(Duration::from_secs(5)));

        policy.record_reconnect_success();
        assert_eq!(policy.record_reconnect_failure(), None);
    }
}
