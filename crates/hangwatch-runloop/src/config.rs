//! Configuration for the RunLoop and the hang watchdog.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RunLoopError, RunLoopResult, WatchdogError, WatchdogResult};

/// Hang watchdog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Expected iterations per second of the supervised loop
    /// (the display refresh rate on a UI thread).
    #[serde(default = "default_target_fps")]
    pub target_fps: f64,

    /// Multiple of one expected iteration an iteration may take before it
    /// counts as a hang.
    #[serde(default = "default_slack_ratio")]
    pub slack_ratio: f64,

    /// Name of the dedicated background executor thread.
    #[serde(default = "default_executor_name")]
    pub executor_name: String,
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

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            slack_ratio: default_slack_ratio(),
            executor_name: default_executor_name(),
        }
    }
}

impl WatchdogConfig {
    /// Create a config for the given refresh rate with the default slack.
    pub fn with_target_fps(target_fps: f64) -> Self {
        Self {
            target_fps,
            ..Self::default()
        }
    }

    /// Set the slack ratio.
    pub fn slack_ratio(mut self, slack_ratio: f64) -> Self {
        self.slack_ratio = slack_ratio;
        self
    }

    /// Derive the hang threshold: `(1 / target_fps) * slack_ratio`.
    ///
    /// 60 fps with the default 1.5 slack gives 25ms.
    pub fn threshold(&self) -> WatchdogResult<Duration> {
        let invalid = || WatchdogError::InvalidThreshold {
            target_fps: self.target_fps,
            slack_ratio: self.slack_ratio,
        };

        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            return Err(invalid());
        }
        if !(self.slack_ratio.is_finite() && self.slack_ratio > 0.0) {
            return Err(invalid());
        }

        let seconds = (1.0 / self.target_fps) * self.slack_ratio;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(invalid());
        }
        Duration::try_from_secs_f64(seconds)
            .ok()
            .filter(|threshold| !threshold.is_zero())
            .ok_or_else(invalid)
    }
}

/// RunLoop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLoopConfig {
    /// Longest time the loop sleeps without a wakeup, in milliseconds.
    /// Each timeout still produces a full iteration.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Maximum number of performed jobs drained in one iteration
    /// (0 = unbounded).
    #[serde(default)]
    pub max_jobs_per_iteration: usize,
}

fn default_idle_poll_ms() -> u64 {
    1000
}

impl Default for RunLoopConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: default_idle_poll_ms(),
            max_jobs_per_iteration: 0,
        }
    }
}

impl RunLoopConfig {
    /// Get the idle poll interval as Duration.
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> RunLoopResult<()> {
        if self.idle_poll_ms == 0 {
            return Err(RunLoopError::ConfigError(
                "idle_poll_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
