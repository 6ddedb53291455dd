//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError::InvalidValue`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_watchdog(config, &mut result);
        Self::validate_run_loop(config, &mut result);
        Self::validate_logging(config, &mut result);
        Self::validate_simulation(config, &mut result);

        result
    }

    fn validate_watchdog(config: &Config, result: &mut ValidationResult) {
        let watchdog = &config.watchdog;

        if !watchdog.target_fps.is_finite() || watchdog.target_fps <= 0.0 {
            result.add_error(ValidationError::new(
                "watchdog.target_fps",
                "target_fps must be a positive number",
            ));
        } else if watchdog.target_fps > 240.0 {
            result.add_warning(ValidationWarning::new(
                "watchdog.target_fps",
                "target_fps is very high (>240), the threshold will be a few milliseconds",
            ));
        }

        if !watchdog.slack_ratio.is_finite() || watchdog.slack_ratio <= 0.0 {
            result.add_error(ValidationError::new(
                "watchdog.slack_ratio",
                "slack_ratio must be a positive number",
            ));
        } else if watchdog.slack_ratio < 1.0 {
            result.add_warning(ValidationWarning::new(
                "watchdog.slack_ratio",
                "slack_ratio below 1.0 reports frames that are still on time",
            ));
        }

        if watchdog.executor_name.is_empty() {
            result.add_error(ValidationError::new(
                "watchdog.executor_name",
                "executor_name cannot be empty",
            ));
        }
    }

    fn validate_run_loop(config: &Config, result: &mut ValidationResult) {
        if config.run_loop.idle_poll_ms == 0 {
            result.add_error(ValidationError::new(
                "run_loop.idle_poll_ms",
                "idle_poll_ms must be greater than 0",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if config.logging.level.is_empty() {
            result.add_error(ValidationError::new(
                "logging.level",
                "level cannot be empty",
            ));
        }
    }

    fn validate_simulation(config: &Config, result: &mut ValidationResult) {
        let simulation = &config.simulation;

        if simulation.tick_ms == 0 {
            result.add_error(ValidationError::new(
                "simulation.tick_ms",
                "tick_ms must be greater than 0",
            ));
        }

        if simulation.hang_every > 0
            && config.watchdog.target_fps > 0.0
            && (simulation.hang_ms as f64) < config.watchdog.threshold_secs() * 1000.0
        {
            result.add_warning(ValidationWarning::new(
                "simulation.hang_ms",
                format!(
                    "hang_ms {} is below the hang threshold, injected stalls will not be reported",
                    simulation.hang_ms
                ),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
