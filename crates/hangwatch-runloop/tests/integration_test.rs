//! End-to-end tests running the watchdog against a real RunLoop.
//!
//! The default configuration gives a 25 ms threshold. Assertions on
//! notification counts allow one notification of slack either way.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use hangwatch_runloop::testing::wait_until;
use hangwatch_runloop::{
    HangDetected, HangId, HangListener, HangMonitor, HangStopped, HangWatchdog, Iteration,
    LoggingObserver, RunLoop, RunLoopAdapter, RunLoopConfig, RunLoopHandle, RunLoopResult,
    RunLoopRunResult, WatchdogConfig, WatchdogState, WATCHDOG_OBSERVER_ID,
};

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    handle: RunLoopHandle,
    thread: JoinHandle<RunLoopResult<RunLoopRunResult>>,
    watchdog: HangWatchdog,
}

impl Harness {
    fn start() -> Self {
        let run_loop = RunLoop::new(RunLoopConfig {
            idle_poll_ms: 50,
            max_jobs_per_iteration: 0,
        })
        .unwrap();
        let handle = run_loop.handle();
        let adapter = Arc::new(RunLoopAdapter::new(handle.clone()));
        let watchdog = HangWatchdog::new(adapter, WatchdogConfig::default()).unwrap();

        let thread = thread::Builder::new()
            .name("supervised".to_string())
            .spawn(move || run_loop.run_for(Duration::from_secs(30)))
            .unwrap();

        Self {
            handle,
            thread,
            watchdog,
        }
    }

    fn wait_observing(&self) {
        assert!(wait_until(WAIT, || self.handle.observer_count() >= 1));
        assert_eq!(self.watchdog.state(), WatchdogState::Observing);
    }

    fn stall(&self, duration: Duration) {
        self.handle.perform(move || thread::sleep(duration));
    }

    fn finish(self) {
        self.handle.stop();
        let result = self.thread.join().unwrap().unwrap();
        assert_eq!(result, RunLoopRunResult::Stopped);
    }
}

type HangLog = Arc<Mutex<Vec<(HangId, Duration)>>>;
type IterationLog = Arc<Mutex<Vec<Iteration>>>;

fn record(watchdog: &HangWatchdog) -> (HangLog, IterationLog) {
    let hangs: HangLog = Arc::new(Mutex::new(Vec::new()));
    let iterations: IterationLog = Arc::new(Mutex::new(Vec::new()));

    let sink = hangs.clone();
    watchdog.add_continuous_listener(move |hang_id, elapsed| sink.lock().push((hang_id, elapsed)));
    let sink = iterations.clone();
    watchdog.add_completion_listener(move |iteration| sink.lock().push(iteration));

    (hangs, iterations)
}

fn longest(iterations: &IterationLog) -> Duration {
    iterations
        .lock()
        .iter()
        .map(Iteration::duration)
        .max()
        .unwrap_or_default()
}

fn by_hang(hangs: &HangLog) -> BTreeMap<HangId, Vec<Duration>> {
    let mut grouped: BTreeMap<HangId, Vec<Duration>> = BTreeMap::new();
    for (hang_id, elapsed) in hangs.lock().iter() {
        grouped.entry(*hang_id).or_default().push(*elapsed);
    }
    grouped
}

#[derive(Default)]
struct RecordingListener {
    detected: Mutex<Vec<HangDetected>>,
    stopped: Mutex<Vec<HangStopped>>,
}

impl HangListener for RecordingListener {
    fn hang_detected(&self, event: HangDetected) {
        self.detected.lock().push(event);
    }

    fn hang_stopped(&self, event: HangStopped) {
        self.stopped.lock().push(event);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_short_iteration_is_not_a_hang() {
    let harness = Harness::start();
    let (hangs, iterations) = record(&harness.watchdog);
    harness.wait_observing();

    harness.stall(Duration::from_millis(5));
    assert!(wait_until(WAIT, || longest(&iterations) >= Duration::from_millis(5)));

    assert!(hangs.lock().is_empty());
    harness.finish();
}

#[test]
fn test_long_iteration_is_reported_repeatedly() {
    let harness = Harness::start();
    let (hangs, iterations) = record(&harness.watchdog);
    harness.wait_observing();

    harness.stall(Duration::from_millis(80));
    assert!(wait_until(WAIT, || longest(&iterations) >= Duration::from_millis(80)));
    assert!(harness.watchdog.wait_for_pending(WAIT));

    let grouped = by_hang(&hangs);
    let (_, elapsed) = grouped
        .iter()
        .max_by_key(|(_, elapsed)| elapsed.len())
        .expect("the stall should be reported");
    assert!(
        (2..=4).contains(&elapsed.len()),
        "expected about 3 notifications, got {elapsed:?}"
    );
    assert!(elapsed.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(elapsed[0] >= Duration::from_millis(25));

    harness.finish();
}

#[test]
fn test_two_stalls_have_distinct_hang_ids() {
    let harness = Harness::start();
    let (hangs, iterations) = record(&harness.watchdog);
    harness.wait_observing();

    harness.stall(Duration::from_millis(80));
    assert!(wait_until(WAIT, || longest(&iterations) >= Duration::from_millis(80)));
    harness.handle.perform_after(Duration::from_millis(20), || {
        thread::sleep(Duration::from_millis(80))
    });
    assert!(wait_until(WAIT, || {
        iterations
            .lock()
            .iter()
            .filter(|iteration| iteration.duration() >= Duration::from_millis(80))
            .count()
            >= 2
    }));
    assert!(harness.watchdog.wait_for_pending(WAIT));

    let long_hangs = by_hang(&hangs)
        .into_values()
        .filter(|elapsed| elapsed.len() >= 2)
        .count();
    assert!(long_hangs >= 2);

    harness.finish();
}

#[test]
fn test_watchdog_observer_coexists_with_other_observers() {
    let harness = Harness::start();
    harness
        .handle
        .add_observer("logging", Box::new(LoggingObserver::new("integration")));
    let (_hangs, _iterations) = record(&harness.watchdog);
    assert!(wait_until(WAIT, || harness.handle.observer_count() == 2));

    assert!(harness.handle.remove_observer(WATCHDOG_OBSERVER_ID));
    assert_eq!(harness.handle.observer_count(), 1);
    harness.finish();
}

#[test]
fn test_removing_listeners_unregisters_from_loop() {
    let harness = Harness::start();
    let hangs = Arc::new(Mutex::new(0usize));

    let sink = hangs.clone();
    let continuous = harness
        .watchdog
        .add_continuous_listener(move |_, _| *sink.lock() += 1);
    let completion = harness.watchdog.add_completion_listener(|_| {});
    harness.wait_observing();

    harness.watchdog.remove_continuous_listener(continuous);
    harness.watchdog.remove_completion_listener(completion);
    assert!(wait_until(WAIT, || harness.handle.observer_count() == 0));
    assert!(wait_until(WAIT, || harness.watchdog.state() == WatchdogState::Idle));

    harness.stall(Duration::from_millis(60));
    thread::sleep(Duration::from_millis(100));
    assert!(harness.watchdog.wait_for_pending(WAIT));
    assert_eq!(*hangs.lock(), 0);

    harness.finish();
}

#[test]
fn test_hang_monitor_reports_start_and_stop() {
    let harness = Harness::start();
    let listener = Arc::new(RecordingListener::default());
    let monitor = HangMonitor::install(&harness.watchdog, listener.clone());
    harness.wait_observing();

    harness.stall(Duration::from_millis(80));
    assert!(wait_until(WAIT, || !listener.stopped.lock().is_empty()));

    let detected = listener.detected.lock().clone();
    let stopped = listener.stopped.lock().clone();
    assert_eq!(detected.len(), 1);
    assert_eq!(stopped.len(), 1);
    assert_eq!(detected[0].hang_id, stopped[0].hang_id);
    assert!(stopped[0].min_duration <= stopped[0].max_duration);
    assert!(stopped[0].max_duration >= Duration::from_millis(80));

    monitor.uninstall();
    assert!(!monitor.is_installed());
    assert!(wait_until(WAIT, || harness.handle.observer_count() == 0));

    harness.finish();
}

#[test]
fn test_paused_monitor_reports_nothing() {
    let harness = Harness::start();
    let listener = Arc::new(RecordingListener::default());
    let monitor = HangMonitor::install(&harness.watchdog, listener.clone());
    harness.wait_observing();

    monitor.pause();
    assert!(monitor.is_paused());
    harness.stall(Duration::from_millis(60));
    assert!(wait_until(WAIT, || harness.watchdog.metrics().snapshot().hangs_detected >= 1));
    thread::sleep(Duration::from_millis(20));
    assert!(listener.detected.lock().is_empty());

    monitor.resume();
    harness.stall(Duration::from_millis(60));
    assert!(wait_until(WAIT, || !listener.stopped.lock().is_empty()));

    drop(monitor);
    harness.finish();
}
