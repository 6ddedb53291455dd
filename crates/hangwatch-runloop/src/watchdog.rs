//! Main-loop hang watchdog.
//!
//! [`HangWatchdog`] watches iteration boundaries of a supervised loop through
//! a [`LoopObserverAdapter`]. Every iteration gets a [`HangSession`] whose
//! monitor task runs on a dedicated serial executor and re-notifies the
//! continuous listeners each time the threshold elapses without the
//! iteration ending. Completion listeners hear about every finished
//! iteration on the supervised thread.
//!
//! State lives in three places:
//!
//! | State                  | Owner                      | Access           |
//! |------------------------|----------------------------|------------------|
//! | active semaphore, start| session driver             | supervised thread|
//! | continuous listeners   | watchdog executor          | executor jobs    |
//! | completion listeners   | watchdog                   | mutex            |
//!
//! Observation starts when the first listener of either kind is added and
//! stops once both registries are empty again.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::adapter::{IterationObserver, LoopObserverAdapter};
use crate::clock::{Clock, UptimeClock};
use crate::config::WatchdogConfig;
use crate::error::WatchdogResult;
use crate::executor::SerialExecutor;
use crate::metrics::WatchdogMetrics;
use crate::mode::WatchdogState;
use crate::registry::{CompletionHandler, CompletionRegistry, ContinuousHandler, ContinuousRegistry};
use crate::semaphore::{
    default_semaphore_factory, CountingSemaphore, Semaphore, SemaphoreFactory, WaitResult,
};
use crate::session::{HangId, HangSession, Iteration, ListenerId};

struct WatchdogInner {
    threshold: Duration,
    clock: Arc<dyn Clock>,
    semaphore_factory: SemaphoreFactory,
    adapter: Arc<dyn LoopObserverAdapter>,
    executor: SerialExecutor<ContinuousRegistry>,
    completion: CompletionRegistry,
    state: AtomicU8,
    metrics: Arc<WatchdogMetrics>,
}

impl WatchdogInner {
    fn state(&self) -> WatchdogState {
        WatchdogState::from(self.state.load(Ordering::SeqCst))
    }

    /// Idle → Observing, on the supervised thread.
    fn start_if_necessary(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.adapter.perform(Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let started = inner
                .state
                .compare_exchange(
                    WatchdogState::Idle as u8,
                    WatchdogState::Observing as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok();
            if started {
                inner.metrics.mark_start();
                inner
                    .adapter
                    .register(Box::new(SessionDriver::new(Arc::downgrade(&inner))));
                debug!(threshold = ?inner.threshold, "Watchdog observing");
            }
        }));
    }

    /// Observing → Idle, on the supervised thread, once the completion
    /// registry is confirmed empty there.
    fn stop_if_unused(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.adapter.perform(Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.completion.is_empty() {
                trace!("Completion listener added meanwhile, still observing");
                return;
            }
            let stopped = inner
                .state
                .compare_exchange(
                    WatchdogState::Observing as u8,
                    WatchdogState::Idle as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok();
            if stopped {
                inner.adapter.unregister();
                debug!("Watchdog idle");
            }
        }));
    }

    fn spawn_monitor(self: &Arc<Self>, session: HangSession) {
        let weak = Arc::downgrade(self);
        let threshold = self.threshold;
        self.metrics.record_session_started();
        self.executor
            .dispatch(move |registry| monitor_session(weak, threshold, session, registry));
    }
}

impl Drop for WatchdogInner {
    fn drop(&mut self) {
        if self.state() == WatchdogState::Observing {
            let adapter = self.adapter.clone();
            self.adapter.perform(Box::new(move || adapter.unregister()));
        }
    }
}

/// Waits out one session on the watchdog executor.
///
/// Exits when the iteration ends (the semaphore is signaled) or when the
/// watchdog is gone by the time a wait times out.
fn monitor_session(
    weak: Weak<WatchdogInner>,
    threshold: Duration,
    session: HangSession,
    registry: &mut ContinuousRegistry,
) {
    let mut first = true;
    loop {
        if session.semaphore.wait(threshold) == WaitResult::Signaled {
            return;
        }

        let Some(inner) = weak.upgrade() else {
            debug!(hang_id = %session.hang_id, "Watchdog dropped, abandoning hang session");
            return;
        };

        let elapsed = inner.clock.now().saturating_sub(session.start_time);
        let notified = registry.notify(session.hang_id, elapsed);
        inner.metrics.record_hang_notification(first);
        first = false;
        trace!(
            hang_id = %session.hang_id,
            elapsed_ms = elapsed.as_millis() as u64,
            listeners = notified,
            "Supervised loop still hanging"
        );
    }
}

/// Per-registration observer driving hang sessions on the supervised thread.
///
/// Owned by the adapter while the watchdog is observing. Dropping it
/// retires the active session.
struct SessionDriver {
    inner: Weak<WatchdogInner>,
    active: Option<Arc<dyn Semaphore>>,
    start_time: Option<Duration>,
}

impl SessionDriver {
    fn new(inner: Weak<WatchdogInner>) -> Self {
        Self {
            inner,
            active: None,
            start_time: None,
        }
    }

    fn retire_active(&mut self) {
        if let Some(semaphore) = self.active.take() {
            semaphore.signal();
        }
    }
}

impl IterationObserver for SessionDriver {
    fn on_iteration_begin(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        self.retire_active();
        let start_time = inner.clock.now();
        self.start_time = Some(start_time);

        match (inner.semaphore_factory)(0) {
            Ok(semaphore) => {
                self.active = Some(semaphore.clone());
                inner.spawn_monitor(HangSession::new(start_time, semaphore));
            }
            Err(e) => {
                inner.metrics.record_session_skipped();
                warn!(error = %e, "Hang monitoring skipped for this iteration");
            }
        }
    }

    fn on_iteration_end(&mut self) {
        self.retire_active();

        let Some(start_time) = self.start_time.take() else {
            return;
        };
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        let iteration = Iteration::new(start_time, inner.clock.now());
        inner.metrics.record_iteration(iteration.duration());
        if inner.completion.notify(iteration) > 0 {
            inner.metrics.record_completion_notification();
        }
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        self.retire_active();
    }
}

/// Builder for [`HangWatchdog`].
pub struct HangWatchdogBuilder {
    adapter: Arc<dyn LoopObserverAdapter>,
    config: WatchdogConfig,
    clock: Option<Arc<dyn Clock>>,
    semaphore_factory: Option<SemaphoreFactory>,
}

impl HangWatchdogBuilder {
    /// Set the watchdog configuration.
    pub fn config(mut self, config: WatchdogConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a custom semaphore factory.
    pub fn semaphore_factory(mut self, factory: SemaphoreFactory) -> Self {
        self.semaphore_factory = Some(factory);
        self
    }

    /// Validate the threshold and spawn the watchdog executor.
    pub fn build(self) -> WatchdogResult<HangWatchdog> {
        let threshold = self.config.threshold()?;
        let executor =
            SerialExecutor::spawn(self.config.executor_name.clone(), ContinuousRegistry::new())?;

        debug!(
            threshold = ?threshold,
            executor = %self.config.executor_name,
            "Hang watchdog created"
        );

        Ok(HangWatchdog {
            inner: Arc::new(WatchdogInner {
                threshold,
                clock: self
                    .clock
                    .unwrap_or_else(|| Arc::new(UptimeClock::new())),
                semaphore_factory: self
                    .semaphore_factory
                    .unwrap_or_else(default_semaphore_factory),
                adapter: self.adapter,
                executor,
                completion: CompletionRegistry::new(),
                state: AtomicU8::new(WatchdogState::Idle as u8),
                metrics: Arc::new(WatchdogMetrics::new()),
            }),
        })
    }
}

/// Main-loop hang watchdog.
///
/// Cheap to clone; clones share one watchdog. When the last clone is
/// dropped the watchdog unregisters from the adapter and any monitor task
/// still waiting exits at its next timeout.
#[derive(Clone)]
pub struct HangWatchdog {
    inner: Arc<WatchdogInner>,
}

impl HangWatchdog {
    /// Create a watchdog with the default clock and semaphores.
    pub fn new(
        adapter: Arc<dyn LoopObserverAdapter>,
        config: WatchdogConfig,
    ) -> WatchdogResult<Self> {
        Self::builder(adapter).config(config).build()
    }

    /// Start building a watchdog for the loop behind `adapter`.
    pub fn builder(adapter: Arc<dyn LoopObserverAdapter>) -> HangWatchdogBuilder {
        HangWatchdogBuilder {
            adapter,
            config: WatchdogConfig::default(),
            clock: None,
            semaphore_factory: None,
        }
    }

    /// Iteration duration past which a hang is reported.
    pub fn threshold(&self) -> Duration {
        self.inner.threshold
    }

    /// Get current state.
    pub fn state(&self) -> WatchdogState {
        self.inner.state()
    }

    /// Get metrics.
    pub fn metrics(&self) -> &Arc<WatchdogMetrics> {
        &self.inner.metrics
    }

    /// Number of registered completion listeners.
    pub fn completion_listener_count(&self) -> usize {
        self.inner.completion.len()
    }

    /// Add a listener called on the watchdog thread every time the
    /// threshold elapses during an ongoing hang.
    ///
    /// Registration is asynchronous: a hang already being monitored when the
    /// registration lands may go unreported to this listener.
    pub fn add_continuous_listener<F>(&self, handler: F) -> ListenerId
    where
        F: FnMut(HangId, Duration) + Send + 'static,
    {
        let id = ListenerId::new();
        let handler: ContinuousHandler = Box::new(handler);
        let weak = Arc::downgrade(&self.inner);

        self.inner.executor.dispatch(move |registry| {
            registry.insert(id, handler);
            if let Some(inner) = weak.upgrade() {
                inner.start_if_necessary();
            }
        });
        id
    }

    /// Remove a continuous listener. Unknown IDs are ignored.
    ///
    /// Removal is asynchronous: the listener may receive one more
    /// notification for a hang already in progress.
    pub fn remove_continuous_listener(&self, id: ListenerId) {
        let weak = Arc::downgrade(&self.inner);

        self.inner.executor.dispatch(move |registry| {
            registry.remove(id);
            if !registry.is_empty() {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.stop_if_unused();
            }
        });
    }

    /// Add a listener called on the supervised thread for every finished
    /// iteration.
    pub fn add_completion_listener<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(Iteration) + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        let handler: CompletionHandler = Arc::new(handler);
        self.inner.completion.insert(id, handler);
        self.inner.start_if_necessary();
        id
    }

    /// Remove a completion listener. Unknown IDs are ignored.
    pub fn remove_completion_listener(&self, id: ListenerId) {
        if !self.inner.completion.remove(id) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner.executor.dispatch(move |registry| {
            if !registry.is_empty() {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                inner.stop_if_unused();
            }
        });
    }

    /// Block until every job queued on the watchdog executor so far has
    /// run, or `timeout` elapses. Returns `false` on timeout.
    ///
    /// A monitor task occupies the executor until its iteration ends, so
    /// never call this from the supervised thread mid-iteration. Always
    /// returns `false` when called on the executor itself.
    pub fn wait_for_pending(&self, timeout: Duration) -> bool {
        if self.inner.executor.is_current() {
            warn!("wait_for_pending called on the watchdog executor");
            return false;
        }

        let done = Arc::new(CountingSemaphore::new(0));
        let signal = done.clone();
        if !self.inner.executor.dispatch(move |_| signal.signal()) {
            return false;
        }
        done.wait(timeout) == WaitResult::Signaled
    }
}

impl std::fmt::Debug for HangWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HangWatchdog")
            .field("threshold", &self.inner.threshold)
            .field("state", &self.state())
            .field("executor", &self.inner.executor.name())
            .field("completion_listeners", &self.completion_listener_count())
            .finish()
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
