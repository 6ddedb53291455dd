//! Monotonic uptime clock used to timestamp iterations.

use std::time::{Duration, Instant};

/// Source of monotonic, non-decreasing uptime.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Clock backed by [`Instant`], measured from its creation.
#[derive(Debug, Clone, Copy)]
pub struct UptimeClock {
    origin: Instant,
}

impl UptimeClock {
    /// Create a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for UptimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for UptimeClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_clock_is_monotonic() {
        let clock = UptimeClock::new();
        let first = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        let second = clock.now();
        assert!(second > first);
    }
}
