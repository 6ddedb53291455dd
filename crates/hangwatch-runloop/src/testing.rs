//! Deterministic test doubles for the watchdog collaborators.
//!
//! - [`ManualClock`]: time only moves when told to.
//! - [`ManualLoopAdapter`]: the test thread plays the supervised loop and
//!   drives iteration boundaries by hand.
//! - [`ScriptedSemaphoreFactory`]: semaphores whose timeouts happen on
//!   demand and advance the manual clock by the requested timeout.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::adapter::{IterationObserver, LoopObserverAdapter, SupervisedJob};
use crate::clock::Clock;
use crate::error::{WatchdogError, WatchdogResult};
use crate::semaphore::{Semaphore, SemaphoreFactory, WaitResult};

/// Clock that only advances when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to an absolute uptime.
    pub fn set(&self, now: Duration) {
        self.nanos.store(as_nanos(now), Ordering::SeqCst);
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(as_nanos(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

type SharedObserver = Arc<Mutex<Box<dyn IterationObserver>>>;

/// Adapter whose supervised thread is the thread that created it.
///
/// Jobs performed from other threads queue up until [`drain`](Self::drain)
/// runs them.
pub struct ManualLoopAdapter {
    observer: Mutex<Option<SharedObserver>>,
    jobs: Mutex<VecDeque<SupervisedJob>>,
    supervised_thread: ThreadId,
    registrations: AtomicUsize,
    unregistrations: AtomicUsize,
}

impl ManualLoopAdapter {
    /// Create an adapter supervised by the calling thread.
    pub fn new() -> Self {
        Self {
            observer: Mutex::new(None),
            jobs: Mutex::new(VecDeque::new()),
            supervised_thread: thread::current().id(),
            registrations: AtomicUsize::new(0),
            unregistrations: AtomicUsize::new(0),
        }
    }

    fn current_observer(&self) -> Option<SharedObserver> {
        self.observer.lock().clone()
    }

    /// Deliver an iteration begin. Returns `false` if nothing is registered.
    pub fn begin(&self) -> bool {
        match self.current_observer() {
            Some(observer) => {
                observer.lock().on_iteration_begin();
                true
            }
            None => false,
        }
    }

    /// Deliver an iteration end. Returns `false` if nothing is registered.
    pub fn end(&self) -> bool {
        match self.current_observer() {
            Some(observer) => {
                observer.lock().on_iteration_end();
                true
            }
            None => false,
        }
    }

    /// Run queued jobs, including jobs they queue, until none are left.
    /// Returns the number of jobs run.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.jobs.lock().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Number of queued jobs.
    pub fn pending_jobs(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Whether an observer is currently registered.
    pub fn is_registered(&self) -> bool {
        self.observer.lock().is_some()
    }

    /// Number of `register` calls so far.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Number of `unregister` calls that removed an observer.
    pub fn unregistrations(&self) -> usize {
        self.unregistrations.load(Ordering::SeqCst)
    }
}

impl Default for ManualLoopAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopObserverAdapter for ManualLoopAdapter {
    fn register(&self, observer: Box<dyn IterationObserver>) {
        let previous = self
            .observer
            .lock()
            .replace(Arc::new(Mutex::new(observer)));
        self.registrations.fetch_add(1, Ordering::SeqCst);
        drop(previous);
    }

    fn unregister(&self) {
        let previous = self.observer.lock().take();
        if previous.is_some() {
            self.unregistrations.fetch_add(1, Ordering::SeqCst);
        }
        drop(previous);
    }

    fn perform(&self, job: SupervisedJob) {
        if thread::current().id() == self.supervised_thread {
            job();
        } else {
            self.jobs.lock().push_back(job);
        }
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    permits: usize,
    timeouts: usize,
    waiting: usize,
}

/// Semaphore whose timeouts are injected by the test.
///
/// `wait` returns `Signaled` as soon as a permit is available, `TimedOut`
/// when a scripted timeout is pending, and blocks otherwise regardless of
/// the requested timeout. Every scripted timeout advances the clock by the
/// requested timeout.
#[derive(Debug)]
pub struct ScriptedSemaphore {
    state: Mutex<ScriptState>,
    changed: Condvar,
    clock: Arc<ManualClock>,
}

impl ScriptedSemaphore {
    fn new(initial: usize, timeouts: usize, clock: Arc<ManualClock>) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                permits: initial,
                timeouts,
                waiting: 0,
            }),
            changed: Condvar::new(),
            clock,
        }
    }

    /// Make the next `count` waits time out.
    pub fn time_out(&self, count: usize) {
        self.state.lock().timeouts += count;
        self.changed.notify_all();
    }

    /// Scripted timeouts not consumed yet.
    pub fn pending_timeouts(&self) -> usize {
        self.state.lock().timeouts
    }

    /// Number of threads blocked in `wait`.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting
    }

    /// Unclaimed permits.
    pub fn permits(&self) -> usize {
        self.state.lock().permits
    }
}

impl Semaphore for ScriptedSemaphore {
    fn wait(&self, timeout: Duration) -> WaitResult {
        let mut state = self.state.lock();
        loop {
            if state.permits > 0 {
                state.permits -= 1;
                return WaitResult::Signaled;
            }
            if state.timeouts > 0 {
                state.timeouts -= 1;
                drop(state);
                self.clock.advance(timeout);
                return WaitResult::TimedOut;
            }
            state.waiting += 1;
            self.changed.wait(&mut state);
            state.waiting -= 1;
        }
    }

    fn signal(&self) {
        self.state.lock().permits += 1;
        self.changed.notify_all();
    }
}

/// Factory handing out [`ScriptedSemaphore`]s and recording each one.
#[derive(Debug)]
pub struct ScriptedSemaphoreFactory {
    clock: Arc<ManualClock>,
    created: Mutex<Vec<Arc<ScriptedSemaphore>>>,
    failures: AtomicUsize,
    timeouts_per_semaphore: AtomicUsize,
}

impl ScriptedSemaphoreFactory {
    /// Create a factory whose semaphores advance `clock`.
    pub fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            created: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
            timeouts_per_semaphore: AtomicUsize::new(0),
        })
    }

    /// Get a [`SemaphoreFactory`] backed by this script.
    pub fn factory(self: &Arc<Self>) -> SemaphoreFactory {
        let script = self.clone();
        Arc::new(move |initial| script.create(initial))
    }

    fn create(&self, initial: usize) -> WatchdogResult<Arc<dyn Semaphore>> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(WatchdogError::SemaphoreUnavailable(
                "scripted failure".to_string(),
            ));
        }

        let semaphore = Arc::new(ScriptedSemaphore::new(
            initial,
            self.timeouts_per_semaphore.load(Ordering::SeqCst),
            self.clock.clone(),
        ));
        self.created.lock().push(semaphore.clone());
        Ok(semaphore)
    }

    /// Fail the next `count` creations.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Pre-script `count` timeouts on every semaphore created from now on.
    pub fn script_timeouts(&self, count: usize) {
        self.timeouts_per_semaphore.store(count, Ordering::SeqCst);
    }

    /// Number of semaphores created so far.
    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    /// The most recently created semaphore.
    pub fn latest(&self) -> Option<Arc<ScriptedSemaphore>> {
        self.created.lock().last().cloned()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if condition() {
            return true;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
