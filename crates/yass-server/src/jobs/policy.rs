use std::time::Duration;
use yass_common::types::ErrorKind;

use super::config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF_SECS};

/// What to do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Fail,
}

/// Fixed-backoff retry with a cap on total attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// `attempts` counts the attempt that just failed.
    pub fn decide(&self, kind: ErrorKind, attempts: u32) -> RetryDecision {
        if kind.is_retryable() && attempts < self.max_attempts {
            RetryDecision::Retry {
                delay: self.backoff,
            }
        } else {
            RetryDecision::Fail
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
        )
    }
}
