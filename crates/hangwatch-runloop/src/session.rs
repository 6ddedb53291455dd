//! Identifiers, iterations and per-iteration hang sessions.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::semaphore::Semaphore;

/// Identity of one hang instance, shared by all of its notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HangId(Uuid);

impl HangId {
    /// Allocate a fresh hang ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for HangId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HangId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle returned when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Allocate a fresh listener ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One completed pass of the supervised loop.
///
/// Times are clock uptime, not wall-clock dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iteration {
    pub start_time: Duration,
    pub end_time: Duration,
}

impl Iteration {
    /// Create an iteration from its boundaries.
    pub fn new(start_time: Duration, end_time: Duration) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    /// Time spent in the iteration.
    pub fn duration(&self) -> Duration {
        self.end_time.saturating_sub(self.start_time)
    }
}

/// State of one in-progress iteration, handed to the monitor task.
///
/// The supervised thread keeps only a clone of the semaphore; everything
/// else moves to the watchdog executor.
pub struct HangSession {
    pub hang_id: HangId,
    pub start_time: Duration,
    pub semaphore: Arc<dyn Semaphore>,
}

impl HangSession {
    /// Start a session with a freshly allocated hang ID.
    pub fn new(start_time: Duration, semaphore: Arc<dyn Semaphore>) -> Self {
        Self {
            hang_id: HangId::new(),
            start_time,
            semaphore,
        }
    }
}

impl std::fmt::Debug for HangSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HangSession")
            .field("hang_id", &self.hang_id)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}
