//! Error types for the run loop and the hang watchdog.

use thiserror::Error;

/// Errors that can occur in the supervised RunLoop.
#[derive(Debug, Error)]
pub enum RunLoopError {
    /// RunLoop is already running on some thread.
    #[error("RunLoop is already running")]
    AlreadyRunning,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for RunLoop operations.
pub type RunLoopResult<T> = Result<T, RunLoopError>;

/// Errors raised while building or driving the hang watchdog.
///
/// None of these ever reach the supervised thread: construction errors are
/// returned to the host, runtime failures are logged and degrade detection.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// Derived hang threshold is zero, negative or not finite.
    #[error("Invalid hang threshold: {target_fps} fps with slack ratio {slack_ratio}")]
    InvalidThreshold { target_fps: f64, slack_ratio: f64 },

    /// The dedicated background executor thread could not be started.
    #[error("Failed to spawn watchdog executor: {0}")]
    ExecutorSpawn(#[from] std::io::Error),

    /// A semaphore for a new hang session could not be created.
    #[error("Semaphore unavailable: {0}")]
    SemaphoreUnavailable(String),
}

/// Result type for watchdog operations.
pub type WatchdogResult<T> = Result<T, WatchdogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_threshold_display() {
        let err = WatchdogError::InvalidThreshold {
            target_fps: 0.0,
            slack_ratio: 1.5,
        };
        let display = err.to_string();
        assert!(display.contains("0 fps"));
        assert!(display.contains("1.5"));
    }

    #[test]
    fn test_executor_spawn_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no threads left");
        let err = WatchdogError::from(io_err);
        assert!(err.to_string().contains("no threads left"));
    }

    #[test]
    fn test_run_loop_errors_display() {
        assert_eq!(RunLoopError::AlreadyRunning.to_string(), "RunLoop is already running");
        let err = RunLoopError::ConfigError("idle_poll_ms must be positive".to_string());
        assert!(err.to_string().contains("idle_poll_ms"));
    }
}
