//! Run subcommand: a supervised loop on the main thread with injected stalls.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use hangwatch_config::{Config, SimulationConfig};
use hangwatch_runloop::{
    HangDetected, HangListener, HangMonitor, HangStopped, HangWatchdog, RunLoop, RunLoopAdapter,
    RunLoopConfig, RunLoopHandle, WatchdogConfig,
};

/// Command-line overrides for `run`.
pub(crate) struct RunOptions {
    pub duration: Option<u64>,
    pub hang_every: Option<u32>,
    pub hang_ms: Option<u64>,
    pub fps: Option<f64>,
    pub json: bool,
}

/// Logs hang start and stop.
struct LogListener;

impl HangListener for LogListener {
    fn hang_detected(&self, event: HangDetected) {
        warn!(
            hang_id = %event.hang_id,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "Hang detected"
        );
    }

    fn hang_stopped(&self, event: HangStopped) {
        info!(
            hang_id = %event.hang_id,
            min_ms = event.min_duration.as_millis() as u64,
            max_ms = event.max_duration.as_millis() as u64,
            "Hang stopped"
        );
    }
}

/// Run the supervised loop until the configured duration elapses or Ctrl-C.
pub(crate) fn run(mut config: Config, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(duration) = options.duration {
        config.simulation.duration_secs = duration;
    }
    if let Some(hang_every) = options.hang_every {
        config.simulation.hang_every = hang_every;
    }
    if let Some(hang_ms) = options.hang_ms {
        config.simulation.hang_ms = hang_ms;
    }
    if let Some(fps) = options.fps {
        config.watchdog.target_fps = fps;
    }

    info!("Starting hangwatch v{}", env!("CARGO_PKG_VERSION"));

    let run_loop = RunLoop::new(RunLoopConfig {
        idle_poll_ms: config.run_loop.idle_poll_ms,
        max_jobs_per_iteration: config.run_loop.max_jobs_per_iteration,
    })?;
    let handle = run_loop.handle();

    let adapter = Arc::new(RunLoopAdapter::new(handle.clone()));
    let watchdog = HangWatchdog::new(
        adapter,
        WatchdogConfig {
            target_fps: config.watchdog.target_fps,
            slack_ratio: config.watchdog.slack_ratio,
            executor_name: config.watchdog.executor_name.clone(),
        },
    )?;
    info!(
        threshold_ms = watchdog.threshold().as_secs_f64() * 1000.0,
        "Watchdog ready"
    );

    let monitor = HangMonitor::install(&watchdog, Arc::new(LogListener));
    let trace = watchdog.add_continuous_listener(|hang_id, elapsed| {
        debug!(hang_id = %hang_id, elapsed_ms = elapsed.as_millis() as u64, "Still hanging");
    });

    let driver = spawn_driver(handle.clone(), config.simulation.clone())?;

    let result = run_loop.run()?;
    info!(?result, iterations = handle.iterations(), "RunLoop finished");

    match driver.join() {
        Ok(outcome) => outcome?,
        Err(_) => return Err("driver thread panicked".into()),
    }

    watchdog.remove_continuous_listener(trace);
    monitor.uninstall();
    if !watchdog.wait_for_pending(Duration::from_secs(1)) {
        warn!("Watchdog executor did not drain in time");
    }

    let snapshot = watchdog.metrics().snapshot();
    if options.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        info!(
            iterations = snapshot.iterations_completed,
            hangs = snapshot.hangs_detected,
            notifications = snapshot.hang_notifications,
            longest_ms = snapshot.longest_iteration_ms(),
            hang_ratio = snapshot.hang_ratio(),
            "Watchdog summary"
        );
    }

    Ok(())
}

/// Feed the loop from a helper thread and stop it when done.
fn spawn_driver(
    handle: RunLoopHandle,
    simulation: SimulationConfig,
) -> std::io::Result<thread::JoinHandle<std::io::Result<()>>> {
    thread::Builder::new()
        .name("hangwatch-driver".to_string())
        .spawn(move || {
            let outcome = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map(|runtime| runtime.block_on(drive(&handle, &simulation)));
            handle.stop();
            outcome
        })
}

async fn drive(handle: &RunLoopHandle, simulation: &SimulationConfig) {
    let mut ticker = tokio::time::interval(Duration::from_millis(simulation.tick_ms.max(1)));
    let deadline = async {
        if simulation.duration_secs == 0 {
            std::future::pending::<()>().await
        } else {
            tokio::time::sleep(Duration::from_secs(simulation.duration_secs)).await
        }
    };
    tokio::pin!(deadline);

    let mut injected: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                injected += 1;
                if is_stall(injected, simulation.hang_every) {
                    let stall = Duration::from_millis(simulation.hang_ms);
                    debug!(job = injected, stall_ms = simulation.hang_ms, "Injecting stall");
                    handle.perform(move || thread::sleep(stall));
                } else {
                    handle.perform(|| {});
                }
            }
            _ = &mut deadline => {
                info!(jobs = injected, "Simulation finished");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Interrupted, stopping");
                break;
            }
        }
    }
}

fn is_stall(job: u64, hang_every: u32) -> bool {
    hang_every > 0 && job % u64::from(hang_every) == 0
}
