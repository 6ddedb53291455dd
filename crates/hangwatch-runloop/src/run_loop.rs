//! Reference supervised RunLoop.
//!
//! A single-threaded, CFRunLoop-style loop. Each pass publishes its phases
//! to the registered observers:
//!
//! ```text
//! Entry
//!   ┌─► BeforeTimers   fire due timers
//!   │   BeforeSources  run queued jobs
//!   │   BeforeWaiting  (stop / deadline checked here)
//!   │   ... sleep until work, a timer, the idle poll or the deadline ...
//!   └── AfterWaiting
//! Exit
//! ```
//!
//! The loop runs on whichever thread calls [`RunLoop::run`]. Everything
//! else goes through a cloneable [`RunLoopHandle`].

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::config::RunLoopConfig;
use crate::error::{RunLoopError, RunLoopResult};
use crate::executor::panic_message;
use crate::mode::{RunLoopPhase, RunLoopRunResult, RunLoopState};
use crate::observer::{ObserverHandle, RunLoopObserver};

/// A unit of work run on the loop thread.
pub type LoopJob = Box<dyn FnOnce() + Send>;

/// Delayed job ordered by deadline, then submission order.
struct TimerEntry {
    deadline: Instant,
    seq: u64,
    job: LoopJob,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed so the BinaryHeap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct LoopQueue {
    jobs: VecDeque<LoopJob>,
    timers: BinaryHeap<TimerEntry>,
    stop_requested: bool,
    next_seq: u64,
}

struct RunLoopShared {
    queue: Mutex<LoopQueue>,
    wakeup: Condvar,
    state: AtomicU8,
    thread: Mutex<Option<ThreadId>>,
    observers: RwLock<Vec<Arc<ObserverHandle>>>,
    iterations: AtomicU64,
}

impl RunLoopShared {
    fn state(&self) -> RunLoopState {
        RunLoopState::from(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: RunLoopState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// The supervised loop.
pub struct RunLoop {
    shared: Arc<RunLoopShared>,
    config: RunLoopConfig,
}

impl RunLoop {
    /// Create a new RunLoop.
    pub fn new(config: RunLoopConfig) -> RunLoopResult<Self> {
        config.validate()?;
        Ok(Self::with_validated_config(config))
    }

    fn with_validated_config(config: RunLoopConfig) -> Self {
        Self {
            shared: Arc::new(RunLoopShared {
                queue: Mutex::new(LoopQueue::default()),
                wakeup: Condvar::new(),
                state: AtomicU8::new(RunLoopState::Created as u8),
                thread: Mutex::new(None),
                observers: RwLock::new(Vec::new()),
                iterations: AtomicU64::new(0),
            }),
            config,
        }
    }

    /// Get a handle for use from other threads.
    pub fn handle(&self) -> RunLoopHandle {
        RunLoopHandle {
            shared: self.shared.clone(),
        }
    }

    /// Get current state.
    pub fn state(&self) -> RunLoopState {
        self.shared.state()
    }

    /// Get the configuration.
    pub fn config(&self) -> &RunLoopConfig {
        &self.config
    }

    /// Run on the calling thread until [`RunLoopHandle::stop`] is called.
    pub fn run(&self) -> RunLoopResult<RunLoopRunResult> {
        self.run_until(None)
    }

    /// Run on the calling thread until stopped or `timeout` elapses.
    pub fn run_for(&self, timeout: Duration) -> RunLoopResult<RunLoopRunResult> {
        self.run_until(Instant::now().checked_add(timeout))
    }

    fn run_until(&self, deadline: Option<Instant>) -> RunLoopResult<RunLoopRunResult> {
        {
            let mut thread = self.shared.thread.lock();
            if thread.is_some() {
                return Err(RunLoopError::AlreadyRunning);
            }
            *thread = Some(thread::current().id());
        }
        self.shared.set_state(RunLoopState::Running);

        debug!("RunLoop: Entry");
        self.notify_observers(RunLoopPhase::Entry);

        let result = loop {
            self.shared.iterations.fetch_add(1, Ordering::Relaxed);

            self.notify_observers(RunLoopPhase::BeforeTimers);
            self.fire_due_timers();

            self.notify_observers(RunLoopPhase::BeforeSources);
            self.drain_jobs();

            self.notify_observers(RunLoopPhase::BeforeWaiting);

            if self.take_stop_request() {
                break RunLoopRunResult::Stopped;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break RunLoopRunResult::TimedOut;
            }

            self.shared.set_state(RunLoopState::Waiting);
            self.wait_for_work(deadline);
            self.shared.set_state(RunLoopState::Running);

            self.notify_observers(RunLoopPhase::AfterWaiting);
        };

        self.shared.set_state(RunLoopState::Stopping);
        debug!("RunLoop: Exit");
        self.notify_observers(RunLoopPhase::Exit);
        self.shared.set_state(RunLoopState::Stopped);
        *self.shared.thread.lock() = None;

        info!(result = ?result, "RunLoop stopped");
        Ok(result)
    }

    /// Notify observers of a phase.
    ///
    /// Works on a snapshot so observers may add or remove observers,
    /// including themselves, from inside the callback. A panicking
    /// observer is logged and the remaining observers still run.
    fn notify_observers(&self, phase: RunLoopPhase) {
        let observers: Vec<Arc<ObserverHandle>> = self.shared.observers.read().clone();
        for handle in &observers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handle.notify(phase)));
            if let Err(payload) = result {
                error!(
                    observer = %handle.id(),
                    phase = ?phase,
                    panic = panic_message(payload.as_ref()),
                    "RunLoop observer panicked"
                );
            }
        }
    }

    fn fire_due_timers(&self) {
        let now = Instant::now();
        let mut due = Vec::new();
        {
            let mut queue = self.shared.queue.lock();
            while queue.timers.peek().is_some_and(|timer| timer.deadline <= now) {
                if let Some(timer) = queue.timers.pop() {
                    due.push(timer.job);
                }
            }
        }
        for job in due {
            run_job(job);
        }
    }

    /// Run the jobs queued before this pass started. Jobs queued while
    /// draining wait for the next pass.
    fn drain_jobs(&self) {
        let queued = self.shared.queue.lock().jobs.len();
        let budget = match self.config.max_jobs_per_iteration {
            0 => queued,
            max => queued.min(max),
        };

        for _ in 0..budget {
            let job = self.shared.queue.lock().jobs.pop_front();
            match job {
                Some(job) => run_job(job),
                None => break,
            }
        }
    }

    fn take_stop_request(&self) -> bool {
        std::mem::take(&mut self.shared.queue.lock().stop_requested)
    }

    fn wait_for_work(&self, deadline: Option<Instant>) {
        let mut queue = self.shared.queue.lock();
        if !queue.jobs.is_empty() || queue.stop_requested {
            return;
        }

        let now = Instant::now();
        let mut wake_at = now.checked_add(self.config.idle_poll()).unwrap_or(now);
        if let Some(timer) = queue.timers.peek() {
            wake_at = wake_at.min(timer.deadline);
        }
        if let Some(deadline) = deadline {
            wake_at = wake_at.min(deadline);
        }

        if wake_at > now {
            self.shared.wakeup.wait_until(&mut queue, wake_at);
        }
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::with_validated_config(RunLoopConfig::default())
    }
}

fn run_job(job: LoopJob) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        error!(panic = panic_message(payload.as_ref()), "RunLoop job panicked");
    }
}

/// Cloneable, thread-safe handle to a [`RunLoop`].
#[derive(Clone)]
pub struct RunLoopHandle {
    shared: Arc<RunLoopShared>,
}

impl RunLoopHandle {
    /// Queue a job for the next pass of the loop.
    pub fn perform<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.queue.lock().jobs.push_back(Box::new(job));
        self.shared.wakeup.notify_one();
    }

    /// Run a job on the loop once `delay` has elapsed.
    pub fn perform_after<F>(&self, delay: Duration, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let now = Instant::now();
        let deadline = now.checked_add(delay).unwrap_or(now);
        {
            let mut queue = self.shared.queue.lock();
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.timers.push(TimerEntry {
                deadline,
                seq,
                job: Box::new(job),
            });
        }
        self.shared.wakeup.notify_one();
    }

    /// Ask the loop to exit at the end of its current pass.
    ///
    /// Similar to CFRunLoopStop. A stop requested while the loop is not
    /// running ends the next run after its first pass.
    pub fn stop(&self) {
        self.shared.queue.lock().stop_requested = true;
        self.shared.wakeup.notify_one();
    }

    /// Wake the loop without queuing work.
    pub fn wakeup(&self) {
        let _queue = self.shared.queue.lock();
        self.shared.wakeup.notify_one();
    }

    /// Whether the caller is the thread currently running the loop.
    pub fn is_current(&self) -> bool {
        *self.shared.thread.lock() == Some(thread::current().id())
    }

    /// Get current state.
    pub fn state(&self) -> RunLoopState {
        self.shared.state()
    }

    /// Number of passes started so far.
    pub fn iterations(&self) -> u64 {
        self.shared.iterations.load(Ordering::Relaxed)
    }

    /// Number of jobs waiting for the next pass.
    pub fn pending_jobs(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    /// Add an observer. Observers run in ascending priority order; equal
    /// priorities keep registration order.
    pub fn add_observer(&self, id: impl Into<String>, observer: Box<dyn RunLoopObserver>) {
        let handle = Arc::new(ObserverHandle::new(id, observer));
        let mut observers = self.shared.observers.write();
        observers.push(handle);
        observers.sort_by_key(|h| h.priority());
    }

    /// Remove every observer registered under `id`. Returns whether any
    /// was found.
    pub fn remove_observer(&self, id: &str) -> bool {
        let mut observers = self.shared.observers.write();
        let before = observers.len();
        observers.retain(|handle| {
            if handle.id() == id {
                handle.mark_removed();
                false
            } else {
                true
            }
        });
        observers.len() != before
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.shared.observers.read().len()
    }
}

impl std::fmt::Debug for RunLoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoopHandle")
            .field("state", &self.state())
            .field("iterations", &self.iterations())
            .finish()
    }
}

#[cfg(test)]
#[path = "run_loop_tests.rs"]
mod tests;
