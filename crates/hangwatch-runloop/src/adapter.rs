//! Bridge between a supervised loop and the watchdog.
//!
//! The watchdog never talks to a concrete loop. It hands an
//! [`IterationObserver`] to a [`LoopObserverAdapter`], which reports the
//! begin and end of every loop iteration on the supervised thread and runs
//! jobs there on request.

use tracing::{debug, warn};

use crate::mode::RunLoopPhase;
use crate::observer::RunLoopObserver;
use crate::run_loop::RunLoopHandle;

/// A job that must run on the supervised thread.
pub type SupervisedJob = Box<dyn FnOnce() + Send>;

/// Receives iteration boundaries on the supervised thread.
///
/// Calls strictly alternate and never overlap. The first call may be an
/// `on_iteration_end` without a matching begin.
pub trait IterationObserver: Send {
    /// The loop woke up and started processing work.
    fn on_iteration_begin(&mut self);

    /// The loop finished processing and is about to wait.
    fn on_iteration_end(&mut self);
}

/// Platform hook for the supervised loop.
pub trait LoopObserverAdapter: Send + Sync {
    /// Install `observer`, replacing any observer registered earlier.
    ///
    /// Called on the supervised thread.
    fn register(&self, observer: Box<dyn IterationObserver>);

    /// Drop the registered observer, if any. Idempotent.
    fn unregister(&self);

    /// Run `job` on the supervised thread: inline when the caller is
    /// already on it, queued otherwise.
    fn perform(&self, job: SupervisedJob);
}

/// Default observer ID used by [`RunLoopAdapter`].
pub const WATCHDOG_OBSERVER_ID: &str = "hangwatch.watchdog";

/// Translates RunLoop phases into iteration boundaries.
///
/// `AfterWaiting` begins an iteration, `BeforeWaiting` ends it. Runs after
/// every other observer of the same phase.
pub struct IterationPhaseObserver {
    inner: Box<dyn IterationObserver>,
}

impl IterationPhaseObserver {
    pub fn new(inner: Box<dyn IterationObserver>) -> Self {
        Self { inner }
    }
}

impl RunLoopObserver for IterationPhaseObserver {
    fn activities(&self) -> u32 {
        RunLoopPhase::ITERATION
    }

    fn priority(&self) -> i32 {
        i32::MAX
    }

    fn on_phase(&mut self, phase: RunLoopPhase) {
        match phase {
            RunLoopPhase::AfterWaiting => self.inner.on_iteration_begin(),
            RunLoopPhase::BeforeWaiting => self.inner.on_iteration_end(),
            _ => {}
        }
    }
}

/// [`LoopObserverAdapter`] for the reference [`RunLoop`](crate::RunLoop).
pub struct RunLoopAdapter {
    handle: RunLoopHandle,
    observer_id: String,
}

impl RunLoopAdapter {
    /// Create an adapter for the loop behind `handle`.
    pub fn new(handle: RunLoopHandle) -> Self {
        Self {
            handle,
            observer_id: WATCHDOG_OBSERVER_ID.to_string(),
        }
    }

    /// Use a custom observer ID, e.g. to attach two watchdogs to one loop.
    pub fn with_observer_id(mut self, observer_id: impl Into<String>) -> Self {
        self.observer_id = observer_id.into();
        self
    }

    /// Get the observer ID used on the loop.
    pub fn observer_id(&self) -> &str {
        &self.observer_id
    }

    /// Get the underlying loop handle.
    pub fn handle(&self) -> &RunLoopHandle {
        &self.handle
    }
}

impl LoopObserverAdapter for RunLoopAdapter {
    fn register(&self, observer: Box<dyn IterationObserver>) {
        if !self.handle.is_current() {
            warn!(
                observer = %self.observer_id,
                "Iteration observer registered off the supervised thread"
            );
        }
        self.handle.remove_observer(&self.observer_id);
        self.handle.add_observer(
            self.observer_id.clone(),
            Box::new(IterationPhaseObserver::new(observer)),
        );
        debug!(observer = %self.observer_id, "Iteration observer registered");
    }

    fn unregister(&self) {
        if self.handle.remove_observer(&self.observer_id) {
            debug!(observer = %self.observer_id, "Iteration observer unregistered");
        }
    }

    fn perform(&self, job: SupervisedJob) {
        if self.handle.is_current() {
            job();
        } else {
            self.handle.perform(job);
        }
    }
}
