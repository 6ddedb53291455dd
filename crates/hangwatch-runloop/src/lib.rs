//! # hangwatch RunLoop
//!
//! Hang detection for the primary loop of an application, plus a reference
//! supervised loop to run it against.
//!
//! ## Design Inspiration
//!
//! The supervised loop follows iOS CFRunLoop: observers hear about
//! `Entry → BeforeTimers → BeforeSources → BeforeWaiting → AfterWaiting → Exit`.
//! An iteration is everything between `AfterWaiting` (the loop woke up) and
//! the next `BeforeWaiting` (it is about to sleep again). The watchdog
//! measures exactly that span, without ever blocking the loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         SUPERVISED THREAD                            │
//! │  IterationObserver (via LoopObserverAdapter)                         │
//! │  • begin: record start, create semaphore, dispatch monitor task      │
//! │  • end:   signal semaphore, notify completion listeners (snapshot)   │
//! └──────────────────────────────────┬───────────────────────────────────┘
//!                                    │ Semaphore::signal()
//!                                    ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       WATCHDOG EXECUTOR (serial)                     │
//! │  • monitor task: wait(threshold) in a loop, notify on every timeout  │
//! │  • owns the continuous listener registry                             │
//! └──────────────────────────────────────────────────────────────────────┘
//!                                    ▲
//! ┌──────────────────────────────────┴───────────────────────────────────┐
//! │                             ANY THREAD                               │
//! │  • add/remove continuous listener → dispatched to the executor       │
//! │  • add/remove completion listener → mutex-protected registry         │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`HangWatchdog`]: lifecycle, sessions and the public listener API
//! - [`LoopObserverAdapter`]: seam to the supervised loop
//! - [`RunLoop`] / [`RunLoopAdapter`]: reference loop and its adapter
//! - [`HangMonitor`]: hang start/stop events on top of the raw listeners
//! - [`WatchdogMetrics`]: counters and snapshots
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hangwatch_runloop::{HangWatchdog, RunLoop, RunLoopAdapter, RunLoopConfig, WatchdogConfig};
//!
//! let run_loop = RunLoop::new(RunLoopConfig::default()).unwrap();
//! let adapter = Arc::new(RunLoopAdapter::new(run_loop.handle()));
//! let watchdog = HangWatchdog::new(adapter, WatchdogConfig::default()).unwrap();
//!
//! watchdog.add_continuous_listener(|hang_id, elapsed| {
//!     eprintln!("hang {hang_id} still going after {elapsed:?}");
//! });
//!
//! run_loop.run().unwrap();
//! ```

pub mod adapter;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod hang_monitor;
pub mod metrics;
pub mod mode;
pub mod observer;
pub mod registry;
pub mod run_loop;
pub mod semaphore;
pub mod session;
pub mod testing;
pub mod watchdog;

// Re-exports
pub use adapter::{
    IterationObserver, IterationPhaseObserver, LoopObserverAdapter, RunLoopAdapter, SupervisedJob,
    WATCHDOG_OBSERVER_ID,
};
pub use clock::{Clock, UptimeClock};
pub use config::{RunLoopConfig, WatchdogConfig};
pub use error::{RunLoopError, RunLoopResult, WatchdogError, WatchdogResult};
pub use executor::SerialExecutor;
pub use hang_monitor::{HangDetected, HangListener, HangMonitor, HangStopped};
pub use metrics::{WatchdogMetrics, WatchdogMetricsSnapshot};
pub use mode::{RunLoopPhase, RunLoopRunResult, RunLoopState, WatchdogState};
pub use observer::{LoggingObserver, ObserverHandle, RunLoopObserver};
pub use registry::{CompletionHandler, CompletionRegistry, ContinuousHandler, ContinuousRegistry};
pub use run_loop::{LoopJob, RunLoop, RunLoopHandle};
pub use semaphore::{
    default_semaphore_factory, CountingSemaphore, Semaphore, SemaphoreFactory, WaitResult,
};
pub use session::{HangId, HangSession, Iteration, ListenerId};
pub use watchdog::{HangWatchdog, HangWatchdogBuilder};
