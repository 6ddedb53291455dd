//! RunLoop observer definitions.
//!
//! Observers are notified at specific phases of the RunLoop,
//! similar to CFRunLoopObserver in iOS.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::mode::RunLoopPhase;

/// RunLoop observer trait.
///
/// Similar to CFRunLoopObserver in iOS. Callbacks run on the thread that
/// runs the loop, between phases, so they must return quickly.
pub trait RunLoopObserver: Send {
    /// Get the activity mask (which phases to observe).
    /// Use RunLoopPhase::ALL to observe all phases.
    fn activities(&self) -> u32;

    /// Observer priority (lower = executed first).
    fn priority(&self) -> i32 {
        0
    }

    /// Called when an observed phase is reached.
    fn on_phase(&mut self, phase: RunLoopPhase);
}

/// Observer registration handle.
pub struct ObserverHandle {
    id: String,
    activities: u32,
    priority: i32,
    observer: Mutex<Box<dyn RunLoopObserver>>,
    removed: AtomicBool,
}

impl ObserverHandle {
    /// Create a new observer handle.
    pub fn new(id: impl Into<String>, observer: Box<dyn RunLoopObserver>) -> Self {
        Self {
            id: id.into(),
            activities: observer.activities(),
            priority: observer.priority(),
            observer: Mutex::new(observer),
            removed: AtomicBool::new(false),
        }
    }

    /// Get the observer ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the observer priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Check if this observer should be triggered for the given phase.
    pub fn should_trigger(&self, phase: RunLoopPhase) -> bool {
        !self.removed.load(Ordering::SeqCst) && phase.matches(self.activities)
    }

    /// Mark as removed. A handle already captured by an in-flight
    /// notification pass is skipped from then on.
    pub fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    /// Check if the handle was removed.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Deliver a phase if the observer is still interested in it.
    pub fn notify(&self, phase: RunLoopPhase) -> bool {
        if !self.should_trigger(phase) {
            return false;
        }
        self.observer.lock().on_phase(phase);
        true
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("id", &self.id)
            .field("activities", &self.activities)
            .field("priority", &self.priority)
            .field("removed", &self.is_removed())
            .finish()
    }
}

/// Logging observer for debugging.
///
/// Logs all phase transitions.
pub struct LoggingObserver {
    name: String,
    seen: u64,
}

impl LoggingObserver {
    /// Create a new logging observer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: 0,
        }
    }

    /// Number of phases logged so far.
    pub fn phases_seen(&self) -> u64 {
        self.seen
    }
}

impl RunLoopObserver for LoggingObserver {
    fn activities(&self) -> u32 {
        RunLoopPhase::ALL
    }

    fn priority(&self) -> i32 {
        -1000
    }

    fn on_phase(&mut self, phase: RunLoopPhase) {
        self.seen += 1;
        debug!(observer = %self.name, seen = self.seen, "RunLoop phase: {:?}", phase);
    }
}
