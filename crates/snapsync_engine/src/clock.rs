//! Wall-clock time sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in milliseconds since the Unix epoch.
///
/// Entry timestamps and event `created_at` values are read from here.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds.
    fn now_millis(&self) -> u64;

    /// Returns the current time in whole seconds.
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        unix_millis()
    }
}

/// Wall time that follows the tokio clock.
///
/// Anchored to the system clock at creation and advanced by tokio's
/// `Instant`, so it moves with `tokio::time::pause` and `advance`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_millis: u64,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    /// Creates a clock anchored at the current system time.
    pub fn new() -> Self {
        Self::starting_at(unix_millis())
    }

    /// Creates a clock that reads `millis` now.
    pub fn starting_at(millis: u64) -> Self {
        Self {
            anchor_millis: millis,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.anchor_millis.saturating_add(elapsed)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `millis`.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Sets the time.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Moves the time forward.
    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn manual_clock() {
        let clock = ManualClock::new(1_500);
        assert_eq!(clock.now_millis(), 1_500);
        assert_eq!(clock.now_secs(), 1);

        clock.advance(600);
        assert_eq!(clock.now_secs(), 2);

        clock.set(10);
        assert_eq!(clock.now_millis(), 10);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::starting_at(1_000_000);
        assert_eq!(clock.now_millis(), 1_000_000);

        tokio::time::advance(Duration::from_millis(2_500)).await;
        assert_eq!(clock.now_millis(), 1_002_500);
    }
}
