//! Retry delay selection and backoff.
//!
//! The base delay before retrying a network operation depends on network
//! status: a short delay normally, a long one on constrained (mobile)
//! networks, and never more than [`OFFLINE_DELAY_CAP`] while offline so the
//! retry fires soon after connectivity returns. Successive retries grow the
//! base delay exponentially up to a cap.

use crate::error::Result;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Upper bound on the retry delay while the network is offline.
pub const OFFLINE_DELAY_CAP: Duration = Duration::from_secs(5);

/// Reports the state of the network the probe runs on.
pub trait NetworkStatus: Send + Sync {
    fn is_online(&self) -> bool;

    /// Whether the connection is metered or slow (e.g. mobile).
    fn is_constrained(&self) -> bool {
        false
    }
}

/// Network status that always reports an unconstrained online network.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssumeOnline;

impl NetworkStatus for AssumeOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Chooses between a short and a long delay based on network status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelaySelector {
    pub short: Duration,
    pub long: Duration,
}

impl DelaySelector {
    pub fn new(short: Duration, long: Duration) -> Self {
        debug_assert!(long >= short, "long delay must not be shorter than short delay");
        Self { short, long }
    }

    /// Delay to use under the given network status.
    pub fn select(&self, status: &dyn NetworkStatus) -> Duration {
        if !status.is_online() {
            return self.short.min(OFFLINE_DELAY_CAP);
        }
        if status.is_constrained() {
            self.long
        } else {
            self.short
        }
    }
}

impl Default for DelaySelector {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(1),
            long: Duration::from_secs(10),
        }
    }
}

/// Exponential backoff on top of a [`DelaySelector`].
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Base delay for the first retry.
    pub delays: DelaySelector,

    /// Growth factor per attempt.
    pub multiplier: f64,

    /// Largest delay between attempts.
    pub max_delay: Duration,

    /// Total attempts, including the first. 1 means never retry.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            delays: DelaySelector::default(),
            multiplier: 1.5,
            max_delay: Duration::from_secs(60),
            max_attempts: 1,
        }
    }
}

impl BackoffPolicy {
    /// A policy that makes up to `max_attempts` attempts with default delays.
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay after failed attempt `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32, status: &dyn NetworkStatus) -> Duration {
        let base = self.delays.select(status).as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = base * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Whether no attempts remain after `attempts` have been made.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Sleeps between failed attempts. The last error is returned unchanged.
pub fn retry<T>(
    policy: &BackoffPolicy,
    status: &dyn NetworkStatus,
    what: &str,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if policy.is_exhausted(attempt) {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt - 1, status);
                warn!(what, attempt, ?delay, error = %e, "retrying after failure");
                thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;

    struct Status {
        online: bool,
        constrained: bool,
    }

    impl NetworkStatus for Status {
        fn is_online(&self) -> bool {
            self.online
        }

        fn is_constrained(&self) -> bool {
            self.constrained
        }
    }

    const ONLINE: Status = Status {
        online: true,
        constrained: false,
    };

    #[test]
    fn test_select_online() {
        let selector = DelaySelector::new(Duration::from_secs(2), Duration::from_secs(30));
        assert_eq!(selector.select(&ONLINE), Duration::from_secs(2));
    }

    #[test]
    fn test_select_constrained() {
        let selector = DelaySelector::new(Duration::from_secs(2), Duration::from_secs(30));
        let mobile = Status {
            online: true,
            constrained: true,
        };
        assert_eq!(selector.select(&mobile), Duration::from_secs(30));
    }

    #[test]
    fn test_select_offline_is_capped() {
        let offline = Status {
            online: false,
            constrained: true,
        };
        let selector = DelaySelector::new(Duration::from_secs(8), Duration::from_secs(30));
        assert_eq!(selector.select(&offline), OFFLINE_DELAY_CAP);

        let selector = DelaySelector::new(Duration::from_secs(2), Duration::from_secs(30));
        assert_eq!(selector.select(&offline), Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = BackoffPolicy {
            delays: DelaySelector::new(Duration::from_secs(1), Duration::from_secs(1)),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            max_attempts: 10,
        };

        assert_eq!(policy.delay_for(0, &ONLINE), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1, &ONLINE), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, &ONLINE), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, &ONLINE), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40, &ONLINE), Duration::from_secs(5));
    }

    #[test]
    fn test_default_policy_never_retries() {
        let mut calls = 0;
        let result: Result<()> = retry(&BackoffPolicy::default(), &AssumeOnline, "op", || {
            calls += 1;
            Err(ProbeError::Channel("down".to_string()))
        });

        assert!(matches!(result, Err(ProbeError::Channel(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retry_until_success() {
        let policy = BackoffPolicy {
            delays: DelaySelector::new(Duration::from_millis(1), Duration::from_millis(1)),
            max_attempts: 5,
            ..Default::default()
        };

        let mut calls = 0;
        let result = retry(&policy, &AssumeOnline, "op", || {
            calls += 1;
            if calls < 3 {
                Err(ProbeError::Channel("flaky".to_string()))
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_gives_up() {
        let policy = BackoffPolicy {
            delays: DelaySelector::new(Duration::from_millis(1), Duration::from_millis(1)),
            max_attempts: 3,
            ..Default::default()
        };

        let mut calls = 0;
        let result: Result<()> = retry(&policy, &AssumeOnline, "op", || {
            calls += 1;
            Err(ProbeError::Channel(format!("failure {}", calls)))
        });

        match result {
            Err(ProbeError::Channel(msg)) => assert_eq!(msg, "failure 3"),
            other => panic!("Expected channel error, got {:?}", other),
        }
    }
}
