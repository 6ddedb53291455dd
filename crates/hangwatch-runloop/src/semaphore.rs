//! Counting semaphore with timed waits.
//!
//! One semaphore is created per hang session: the supervised thread signals
//! it at iteration end, the watchdog executor waits on it in threshold-sized
//! slices.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::WatchdogResult;

/// Outcome of [`Semaphore::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// A permit was acquired.
    Signaled,
    /// The timeout elapsed without a permit.
    TimedOut,
}

/// Semaphore contract consumed by the watchdog.
pub trait Semaphore: Send + Sync {
    /// Block the calling thread up to `timeout` waiting for a permit.
    fn wait(&self, timeout: Duration) -> WaitResult;

    /// Release one permit, waking at most one waiter.
    fn signal(&self);
}

/// Creates the semaphore for each new hang session.
///
/// Returning an error skips monitoring for that iteration only.
pub type SemaphoreFactory = Arc<dyn Fn(usize) -> WatchdogResult<Arc<dyn Semaphore>> + Send + Sync>;

/// Default factory producing [`CountingSemaphore`]s.
pub fn default_semaphore_factory() -> SemaphoreFactory {
    Arc::new(|initial| Ok(Arc::new(CountingSemaphore::new(initial)) as Arc<dyn Semaphore>))
}

/// Counting semaphore built on a mutex and condition variable.
#[derive(Debug, Default)]
pub struct CountingSemaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl CountingSemaphore {
    /// Create a semaphore holding `initial` permits.
    pub fn new(initial: usize) -> Self {
        Self {
            permits: Mutex::new(initial),
            available: Condvar::new(),
        }
    }

    /// Current number of unclaimed permits.
    pub fn permits(&self) -> usize {
        *self.permits.lock()
    }
}

impl Semaphore for CountingSemaphore {
    fn wait(&self, timeout: Duration) -> WaitResult {
        // Overflowing deadlines wait without a bound.
        let deadline = Instant::now().checked_add(timeout);
        let mut permits = self.permits.lock();

        while *permits == 0 {
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut permits, deadline).timed_out() {
                        if *permits == 0 {
                            return WaitResult::TimedOut;
                        }
                        break;
                    }
                }
                None => self.available.wait(&mut permits),
            }
        }

        *permits -= 1;
        WaitResult::Signaled
    }

    fn signal(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.available.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_times_out_without_permit() {
        let semaphore = CountingSemaphore::new(0);
        let started = Instant::now();
        assert_eq!(semaphore.wait(Duration::from_millis(20)), WaitResult::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_initial_permits_are_consumed() {
        let semaphore = CountingSemaphore::new(2);
        assert_eq!(semaphore.wait(Duration::ZERO), WaitResult::Signaled);
        assert_eq!(semaphore.wait(Duration::ZERO), WaitResult::Signaled);
        assert_eq!(semaphore.wait(Duration::ZERO), WaitResult::TimedOut);
    }

    #[test]
    fn test_signal_before_wait_is_observed() {
        let semaphore = CountingSemaphore::new(0);
        semaphore.signal();
        assert_eq!(semaphore.permits(), 1);
        assert_eq!(semaphore.wait(Duration::from_millis(1)), WaitResult::Signaled);
        assert_eq!(semaphore.permits(), 0);
    }

    #[test]
    fn test_signal_wakes_blocked_waiter() {
        let semaphore = Arc::new(CountingSemaphore::new(0));
        let waiter = {
            let semaphore = semaphore.clone();
            std::thread::spawn(move || semaphore.wait(Duration::from_secs(5)))
        };

        std::thread::sleep(Duration::from_millis(20));
        semaphore.signal();
        assert_eq!(waiter.join().unwrap(), WaitResult::Signaled);
    }

    #[test]
    fn test_timed_out_then_signaled() {
        let semaphore = CountingSemaphore::new(0);
        assert_eq!(semaphore.wait(Duration::from_millis(5)), WaitResult::TimedOut);
        semaphore.signal();
        assert_eq!(semaphore.wait(Duration::from_millis(5)), WaitResult::Signaled);
    }

    #[test]
    fn test_default_factory() {
        let factory = default_semaphore_factory();
        let semaphore = factory(1).unwrap();
        assert_eq!(semaphore.wait(Duration::ZERO), WaitResult::Signaled);
    }
}
