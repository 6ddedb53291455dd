//! RunLoop phase and state definitions.
//!
//! Phases mirror CFRunLoopActivity so observers can hook the same
//! boundaries a platform event loop exposes.

use serde::{Deserialize, Serialize};

/// RunLoop execution phase.
///
/// Corresponds to CFRunLoopActivity in iOS.
/// Observers can watch for these phases to perform work at specific points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum RunLoopPhase {
    /// Entering the RunLoop (kCFRunLoopEntry).
    Entry = 1 << 0,

    /// About to process timers (kCFRunLoopBeforeTimers).
    BeforeTimers = 1 << 1,

    /// About to process performed jobs (kCFRunLoopBeforeSources).
    BeforeSources = 1 << 2,

    /// About to sleep (kCFRunLoopBeforeWaiting).
    /// Marks the end of an iteration.
    BeforeWaiting = 1 << 5,

    /// Just woke up from sleep (kCFRunLoopAfterWaiting).
    /// Marks the beginning of an iteration.
    AfterWaiting = 1 << 6,

    /// Exiting the RunLoop (kCFRunLoopExit).
    Exit = 1 << 7,
}

impl RunLoopPhase {
    /// Get all phases as a bitmask.
    pub const ALL: u32 = Self::Entry as u32
        | Self::BeforeTimers as u32
        | Self::BeforeSources as u32
        | Self::BeforeWaiting as u32
        | Self::AfterWaiting as u32
        | Self::Exit as u32;

    /// Phases bracketing one iteration of work.
    pub const ITERATION: u32 = Self::AfterWaiting as u32 | Self::BeforeWaiting as u32;

    /// Check if this phase is included in the given activity mask.
    pub fn matches(&self, activities: u32) -> bool {
        (activities & (*self as u32)) != 0
    }
}

/// RunLoop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RunLoopState {
    /// Initial state, not started.
    Created = 0,
    /// Running and processing jobs.
    Running = 1,
    /// Sleeping until a wakeup or timer.
    Waiting = 2,
    /// Stop requested, finishing the current iteration.
    Stopping = 3,
    /// Stopped. The loop may be run again.
    Stopped = 4,
}

impl From<u8> for RunLoopState {
    fn from(v: u8) -> Self {
        match v {
            0 => RunLoopState::Created,
            1 => RunLoopState::Running,
            2 => RunLoopState::Waiting,
            3 => RunLoopState::Stopping,
            4 => RunLoopState::Stopped,
            _ => RunLoopState::Created,
        }
    }
}

impl std::fmt::Display for RunLoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunLoopState::Created => write!(f, "created"),
            RunLoopState::Running => write!(f, "running"),
            RunLoopState::Waiting => write!(f, "waiting"),
            RunLoopState::Stopping => write!(f, "stopping"),
            RunLoopState::Stopped => write!(f, "stopped"),
        }
    }
}

/// RunLoop run result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLoopRunResult {
    /// RunLoop was stopped through its handle.
    Stopped,
    /// RunLoop reached the run deadline.
    TimedOut,
}

/// Watchdog lifecycle state.
///
/// `Observing` means the watchdog is registered with the loop adapter.
/// Transitions are driven solely by listener registry population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WatchdogState {
    /// Not registered with the adapter, no sessions.
    Idle = 0,
    /// Registered and reacting to iteration boundaries.
    Observing = 1,
}

impl From<u8> for WatchdogState {
    fn from(v: u8) -> Self {
        match v {
            1 => WatchdogState::Observing,
            _ => WatchdogState::Idle,
        }
    }
}

impl std::fmt::Display for WatchdogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchdogState::Idle => write!(f, "idle"),
            WatchdogState::Observing => write!(f, "observing"),
        }
    }
}

#[cfg(test)]
#[path = "mode_tests.rs"]
mod tests;
