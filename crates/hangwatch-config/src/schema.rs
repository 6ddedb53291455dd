//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watchdog: WatchdogSection,

    #[serde(default)]
    pub run_loop: RunLoopSection,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Hang detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogSection {
    /// Expected frame rate of the supervised loop.
    #[serde(default = "default_target_fps")]
    pub target_fps: f64,

    /// Multiple of the frame interval tolerated before reporting a hang.
    #[serde(default = "default_slack_ratio")]
    pub slack_ratio: f64,

    /// Thread name of the watchdog executor.
    #[serde(default = "default_executor_name")]
    pub executor_name: String,
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            slack_ratio: default_slack_ratio(),
            executor_name: default_executor_name(),
        }
    }
}

impl WatchdogSection {
    /// Hang threshold in seconds: `(1 / target_fps) * slack_ratio`.
    pub fn threshold_secs(&self) -> f64 {
        self.slack_ratio / self.target_fps
    }
}

fn default_target_fps() -> f64 {
    60.0
}

fn default_slack_ratio() -> f64 {
    1.5
}

fn default_executor_name() -> String {
    "hangwatch-watchdog".to_string()
}

/// Supervised run loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLoopSection {
    /// Longest idle wait before the loop wakes up on its own.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Jobs drained per iteration, 0 for unlimited.
    #[serde(default)]
    pub max_jobs_per_iteration: usize,
}

impl Default for RunLoopSection {
    fn default() -> Self {
        Self {
            idle_poll_ms: default_idle_poll_ms(),
            max_jobs_per_iteration: 0,
        }
    }
}

fn default_idle_poll_ms() -> u64 {
    1000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Write a daily-rolling log file next to console output.
    #[serde(default)]
    pub file: bool,

    /// Emit console output as JSON lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_dir: default_log_dir(),
            file: false,
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".hangwatch").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".hangwatch/logs"))
}

/// Stall injection for the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Total run time, 0 to run until interrupted.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// Interval between injected jobs.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Every n-th job stalls, 0 to never stall.
    #[serde(default = "default_hang_every")]
    pub hang_every: u32,

    /// Length of a stalling job.
    #[serde(default = "default_hang_ms")]
    pub hang_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            tick_ms: default_tick_ms(),
            hang_every: default_hang_every(),
            hang_ms: default_hang_ms(),
        }
    }
}

fn default_duration_secs() -> u64 {
    10
}

fn default_tick_ms() -> u64 {
    100
}

fn default_hang_every() -> u32 {
    10
}

fn default_hang_ms() -> u64 {
    120
}
