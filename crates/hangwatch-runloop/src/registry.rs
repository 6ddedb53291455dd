//! Listener registries.
//!
//! The two registries follow different synchronization disciplines:
//!
//! - [`ContinuousRegistry`] is confined to the watchdog executor. It has no
//!   lock; it is only reachable as the executor's state, so every access is
//!   already serialized with the monitor task that reads it.
//! - [`CompletionRegistry`] is shared between caller threads and the
//!   supervised thread, and guards every access with a mutex.
//!
//! Both keep insertion order, so notification order is stable.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::error;

use crate::executor::panic_message;
use crate::session::{HangId, Iteration, ListenerId};

/// Called repeatedly on the watchdog executor while a hang is ongoing.
pub type ContinuousHandler = Box<dyn FnMut(HangId, Duration) + Send>;

/// Called once per finished iteration on the supervised thread.
pub type CompletionHandler = Arc<dyn Fn(Iteration) + Send + Sync>;

/// Executor-confined registry of continuous listeners.
#[derive(Default)]
pub struct ContinuousRegistry {
    entries: Vec<(ListenerId, ContinuousHandler)>,
}

impl ContinuousRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `id`, replacing any previous one.
    pub fn insert(&mut self, id: ListenerId, handler: ContinuousHandler) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = handler,
            None => self.entries.push((id, handler)),
        }
    }

    /// Remove the handler registered under `id`. Unknown IDs are ignored.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    /// Whether any listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Invoke every listener with the hang's progress. Returns the number
    /// of listeners called.
    ///
    /// A panicking listener is logged and skipped; the others still run.
    pub fn notify(&mut self, hang_id: HangId, elapsed: Duration) -> usize {
        for (id, handler) in self.entries.iter_mut() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(hang_id, elapsed)));
            if let Err(payload) = result {
                error!(
                    listener = %id,
                    panic = panic_message(payload.as_ref()),
                    "Continuous listener panicked"
                );
            }
        }
        self.entries.len()
    }
}

impl std::fmt::Debug for ContinuousRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuousRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Mutex-protected registry of completion listeners.
#[derive(Default)]
pub struct CompletionRegistry {
    entries: Mutex<Vec<(ListenerId, CompletionHandler)>>,
}

impl CompletionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `id`, replacing any previous one.
    pub fn insert(&self, id: ListenerId, handler: CompletionHandler) {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = handler,
            None => entries.push((id, handler)),
        }
    }

    /// Remove the handler registered under `id` and report whether the
    /// registry is empty afterwards. Unknown IDs are ignored.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        entries.retain(|(existing, _)| *existing != id);
        entries.is_empty()
    }

    /// Whether any listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Copy the current handlers out of the lock.
    pub fn snapshot(&self) -> Vec<CompletionHandler> {
        self.entries
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect()
    }

    /// Invoke every listener registered at the time of the call.
    ///
    /// Handlers run outside the lock, so they may add or remove listeners,
    /// including themselves. Returns the number of listeners called.
    pub fn notify(&self, iteration: Iteration) -> usize {
        let handlers = self.snapshot();
        for handler in &handlers {
            handler(iteration);
        }
        handlers.len()
    }
}

impl std::fmt::Debug for CompletionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
