//! Hang start/stop events built on top of the watchdog listeners.
//!
//! [`HangMonitor`] turns the raw listener callbacks into two events per
//! hang: [`HangDetected`] on the first continuous notification and
//! [`HangStopped`] once the hanging iteration completes. Every detected
//! hang gets exactly one stop event, even when the iteration completes
//! before its first notification is delivered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::session::{HangId, Iteration, ListenerId};
use crate::watchdog::HangWatchdog;

/// A hang crossed the threshold for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HangDetected {
    pub hang_id: HangId,
    pub elapsed: Duration,
}

/// A hang ended.
///
/// The true duration lies between the last reported elapsed time and the
/// measured length of the iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HangStopped {
    pub hang_id: HangId,
    pub min_duration: Duration,
    pub max_duration: Duration,
}

/// Receives hang events.
///
/// `hang_detected` runs on the watchdog thread. `hang_stopped` usually runs
/// on the supervised thread, and on the watchdog thread when the hanging
/// iteration completed before its first notification arrived.
pub trait HangListener: Send + Sync {
    fn hang_detected(&self, event: HangDetected);
    fn hang_stopped(&self, event: HangStopped);
}

#[derive(Debug, Clone, Copy)]
struct PendingHang {
    hang_id: HangId,
    elapsed: Duration,
}

#[derive(Debug, Default)]
struct Tracker {
    /// Detected hang waiting for its iteration to complete.
    pending: Option<PendingHang>,
    /// Latest iteration that completed with no detected hang pending.
    unclaimed: Option<Iteration>,
    /// Late notifications for this hang are ignored.
    last_stopped: Option<HangId>,
}

enum HangEvent {
    Detected(HangDetected),
    Stopped(HangStopped),
}

struct MonitorState {
    listener: Arc<dyn HangListener>,
    paused: AtomicBool,
    tracker: Mutex<Tracker>,
}

impl MonitorState {
    fn new(listener: Arc<dyn HangListener>) -> Self {
        Self {
            listener,
            paused: AtomicBool::new(false),
            tracker: Mutex::new(Tracker::default()),
        }
    }

    fn on_hang(&self, hang_id: HangId, elapsed: Duration) {
        let mut events = Vec::new();
        {
            let mut tracker = self.tracker.lock();
            if tracker.last_stopped == Some(hang_id) {
                return;
            }
            if let Some(hang) = tracker.pending.as_mut() {
                if hang.hang_id == hang_id {
                    hang.elapsed = hang.elapsed.max(elapsed);
                    return;
                }
            }

            // A new hang id means the pending hang's iteration is over.
            if let Some(previous) = tracker.pending.take() {
                tracker.last_stopped = Some(previous.hang_id);
                events.push(HangEvent::Stopped(HangStopped {
                    hang_id: previous.hang_id,
                    min_duration: previous.elapsed,
                    max_duration: previous.elapsed,
                }));
            }

            let unclaimed = tracker.unclaimed.take();
            if !self.paused.load(Ordering::SeqCst) {
                events.push(HangEvent::Detected(HangDetected { hang_id, elapsed }));

                // The hanging iteration completed before its first
                // notification got here.
                match unclaimed.filter(|iteration| iteration.duration() >= elapsed) {
                    Some(iteration) => {
                        tracker.last_stopped = Some(hang_id);
                        events.push(HangEvent::Stopped(HangStopped {
                            hang_id,
                            min_duration: elapsed,
                            max_duration: iteration.duration(),
                        }));
                    }
                    None => tracker.pending = Some(PendingHang { hang_id, elapsed }),
                }
            }
        }
        self.emit(events);
    }

    fn on_iteration(&self, iteration: Iteration) {
        let stopped = {
            let mut tracker = self.tracker.lock();
            let Some(hang) = tracker.pending.take() else {
                tracker.unclaimed = Some(iteration);
                return;
            };
            tracker.unclaimed = None;
            tracker.last_stopped = Some(hang.hang_id);

            let duration = iteration.duration();
            let max_duration = if hang.elapsed > duration {
                debug!(
                    hang_id = %hang.hang_id,
                    "Hang belongs to an earlier iteration, closing it at its last elapsed time"
                );
                hang.elapsed
            } else {
                duration
            };
            HangStopped {
                hang_id: hang.hang_id,
                min_duration: hang.elapsed,
                max_duration,
            }
        };
        self.listener.hang_stopped(stopped);
    }

    fn emit(&self, events: Vec<HangEvent>) {
        for event in events {
            match event {
                HangEvent::Detected(event) => self.listener.hang_detected(event),
                HangEvent::Stopped(event) => self.listener.hang_stopped(event),
            }
        }
    }
}

/// Reports hang start/stop events to a [`HangListener`].
///
/// Installs one listener of each kind on the watchdog and removes them
/// again on [`uninstall`](Self::uninstall) or drop.
pub struct HangMonitor {
    watchdog: HangWatchdog,
    state: Arc<MonitorState>,
    listeners: Mutex<Option<(ListenerId, ListenerId)>>,
}

impl HangMonitor {
    /// Start reporting hangs seen by `watchdog` to `listener`.
    pub fn install(watchdog: &HangWatchdog, listener: Arc<dyn HangListener>) -> Self {
        let state = Arc::new(MonitorState::new(listener));

        let continuous = {
            let state = state.clone();
            watchdog.add_continuous_listener(move |hang_id, elapsed| state.on_hang(hang_id, elapsed))
        };
        let completion = {
            let state = state.clone();
            watchdog.add_completion_listener(move |iteration| state.on_iteration(iteration))
        };
        debug!("Hang monitor installed");

        Self {
            watchdog: watchdog.clone(),
            state,
            listeners: Mutex::new(Some((continuous, completion))),
        }
    }

    /// Stop reporting new hangs until [`resume`](Self::resume). A hang
    /// already detected still gets its stop event.
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    /// Resume reporting.
    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    /// Whether the monitor's listeners are still registered.
    pub fn is_installed(&self) -> bool {
        self.listeners.lock().is_some()
    }

    /// Remove both listeners from the watchdog. Idempotent.
    pub fn uninstall(&self) {
        let Some((continuous, completion)) = self.listeners.lock().take() else {
            return;
        };
        self.watchdog.remove_continuous_listener(continuous);
        self.watchdog.remove_completion_listener(completion);
        debug!("Hang monitor uninstalled");
    }
}

impl Drop for HangMonitor {
    fn drop(&mut self) {
        self.uninstall();
    }
}
