//! Time source for the engines.
//!
//! Every delay and timestamp in the interlock and the gate goes through a
//! [`Clock`], so tests can swap real timers for virtual time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Wall-clock time used for record timestamps and seals.
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic time used for latency measurement.
    fn instant(&self) -> Instant;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Milliseconds elapsed since `start`.
    fn elapsed_ms(&self, start: Instant) -> u64 {
        self.instant().saturating_duration_since(start).as_millis() as u64
    }
}

/// Clock backed by the system time and tokio timers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        // Follows tokio's clock so paused runtimes measure virtual latency.
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
