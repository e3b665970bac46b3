//! Time source for scheduling decisions.
//!
//! The queue stamps `run_at` and retention deadlines through a [`Clock`] so
//! that tests can drive delays with tokio's paused time.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time at construction plus elapsed tokio time
///
/// Under `tokio::time::pause` this advances only with the runtime's clock.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    wall_origin: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            wall_origin: Utc::now(),
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + elapsed
    }
}

/// `std::time::Duration` as a chrono delta, saturating on overflow
pub fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let start = clock.now();

        tokio::time::advance(Duration::from_secs(600)).await;

        assert_eq!((clock.now() - start).num_seconds(), 600);
    }

    #[test]
    fn test_to_chrono() {
        assert_eq!(to_chrono(Duration::from_secs(10)).num_seconds(), 10);
    }
}
