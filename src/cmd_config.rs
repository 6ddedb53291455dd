//! Config subcommand handlers for hangwatch.

use std::path::Path;

use tracing::{info, warn};

use hangwatch_config::{Config, ConfigLoader, ConfigValidator};

use crate::cli::ConfigAction;

/// Handle config subcommands.
pub(crate) fn handle_config_command(
    action: ConfigAction,
    default_path: &Path,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Validate { path } => {
            config_validate(path.as_deref().unwrap_or(default_path))
        }
        ConfigAction::Show => config_show(config),
    }
}

/// Validate a configuration file and report every finding.
fn config_validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigLoader::load(path)?;
    let result = ConfigValidator::validate(&config);

    for warning in &result.warnings {
        warn!(path = %warning.path, "{}", warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    if result.is_valid() {
        info!("{} is valid", path.display());
        println!(
            "{}: ok ({} warning(s), threshold {:.2}ms)",
            path.display(),
            result.warnings.len(),
            config.watchdog.threshold_secs() * 1000.0
        );
        Ok(())
    } else {
        Err(format!("{}: {} error(s)", path.display(), result.errors.len()).into())
    }
}

/// Print the effective configuration.
fn config_show(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_good_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[watchdog]\ntarget_fps = 120.0").unwrap();
        assert!(config_validate(file.path()).is_ok());
    }

    #[test]
    fn test_validate_bad_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[simulation]\ntick_ms = 0").unwrap();
        assert!(config_validate(file.path()).is_err());
    }

    #[test]
    fn test_validate_missing_file() {
        assert!(config_validate(Path::new("/nonexistent/hangwatch.toml")).is_err());
    }

    #[test]
    fn test_show_default_config() {
        assert!(config_show(&Config::default()).is_ok());
    }
}
