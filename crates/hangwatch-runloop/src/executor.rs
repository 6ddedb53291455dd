//! Dedicated serial executor owning thread-confined state.
//!
//! Jobs run one at a time, in submission order, on a single named thread.
//! The state `S` lives on that thread and is only reachable through jobs,
//! so it needs no lock. Jobs are allowed to block the thread; a blocked job
//! delays every job queued behind it.
//!
//! Dispatch is fire-and-forget only. Code running on the executor must never
//! wait for another job on the same executor.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// A job run on the executor thread with exclusive access to its state.
pub type ExecutorJob<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Serial executor backed by one dedicated OS thread.
pub struct SerialExecutor<S> {
    name: String,
    tx: mpsc::UnboundedSender<ExecutorJob<S>>,
    thread_id: ThreadId,
}

impl<S: Send + 'static> SerialExecutor<S> {
    /// Spawn the executor thread, moving `state` onto it.
    ///
    /// The thread exits once every handle is dropped and the queue drains.
    pub fn spawn(name: impl Into<String>, state: S) -> std::io::Result<Self> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<ExecutorJob<S>>();

        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let mut state = state;
            debug!(executor = %thread_name, "Executor started");

            while let Some(job) = rx.blocking_recv() {
                let result = panic::catch_unwind(AssertUnwindSafe(|| job(&mut state)));
                if let Err(payload) = result {
                    error!(
                        executor = %thread_name,
                        panic = panic_message(payload.as_ref()),
                        "Executor job panicked"
                    );
                }
            }

            debug!(executor = %thread_name, "Executor stopped");
        })?;

        Ok(Self {
            name,
            tx,
            thread_id: handle.thread().id(),
        })
    }

    /// Queue a job. Returns immediately; `false` if the thread is gone.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            warn!(executor = %self.name, "Executor thread is gone, job dropped");
            return false;
        }
        true
    }

    /// Whether the caller is running on the executor thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Get the executor thread name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_order_on_confined_state() {
        let executor = SerialExecutor::spawn("test-executor", Vec::<u32>::new()).unwrap();
        for i in 0..10 {
            executor.dispatch(move |state| state.push(i));
        }

        let (tx, rx) = std_mpsc::channel();
        executor.dispatch(move |state| tx.send(state.clone()).unwrap());

        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_runs_on_named_thread() {
        let executor = SerialExecutor::spawn("named-executor", ()).unwrap();
        assert_eq!(executor.name(), "named-executor");
        assert!(!executor.is_current());

        let (tx, rx) = std_mpsc::channel();
        executor.dispatch(move |_| {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
        });
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("named-executor"));
    }

    #[test]
    fn test_survives_panicking_job() {
        let executor = SerialExecutor::spawn("panicky-executor", 0u32).unwrap();
        executor.dispatch(|_| panic!("listener blew up"));
        executor.dispatch(|count| *count += 1);

        let (tx, rx) = std_mpsc::channel();
        executor.dispatch(move |count| tx.send(*count).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
