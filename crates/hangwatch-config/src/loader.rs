//! Configuration loader.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_VAR: OnceLock<Regex> = OnceLock::new();

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        config.logging.log_dir =
            Self::expand_path(&config.logging.log_dir.to_string_lossy()).into();
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = match ENV_VAR.get() {
            Some(re) => re,
            None => {
                let re = Regex::new(r"\$\{([^}]+)\}")
                    .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
                ENV_VAR.get_or_init(|| re)
            }
        };

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.hangwatch`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.watchdog.target_fps, 60.0);
    }

    #[test]
    fn test_expand_path() {
        let expanded = ConfigLoader::expand_path("~/.hangwatch");
        assert!(!expanded.starts_with('~'));
    }

    #[test]
    fn test_log_dir_tilde_is_expanded() {
        let config = ConfigLoader::load_str("[logging]\nlog_dir = \"~/hw-logs\"\n").unwrap();
        assert!(!config.logging.log_dir.to_string_lossy().starts_with('~'));
        assert!(config.logging.log_dir.ends_with("hw-logs"));
    }

    #[test]
    fn test_load_basic_config() {
        let content = r#"
            [watchdog]
            target_fps = 120.0
            slack_ratio = 2.0

            [simulation]
            hang_every = 3
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.watchdog.target_fps, 120.0);
        assert_eq!(config.watchdog.slack_ratio, 2.0);
        assert_eq!(config.simulation.hang_every, 3);
        assert_eq!(config.simulation.tick_ms, 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[run_loop]\nidle_poll_ms = 250").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.run_loop.idle_poll_ms, 250);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/hangwatch.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            ConfigLoader::load_or_default(Path::new("/nonexistent/hangwatch.toml")).unwrap();
        assert_eq!(config.watchdog.slack_ratio, 1.5);
    }

    #[test]
    fn test_shipped_default_config() {
        let config = ConfigLoader::load_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.watchdog.target_fps, 60.0);
        assert_eq!(config.simulation.hang_ms, 120);
        assert!(!config.logging.log_dir.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_invalid_toml() {
        let result = ConfigLoader::load_str("[watchdog\ntarget_fps = ");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: test-only, variable name is unique to this test.
        unsafe { std::env::set_var("HANGWATCH_TEST_EXECUTOR", "from-env") };
        let config = ConfigLoader::load_str(
            "[watchdog]\nexecutor_name = \"${HANGWATCH_TEST_EXECUTOR}\"\n",
        )
        .unwrap();
        assert_eq!(config.watchdog.executor_name, "from-env");
    }

    #[test]
    fn test_missing_env_var() {
        let result = ConfigLoader::load_str(
            "[watchdog]\nexecutor_name = \"${HANGWATCH_TEST_DEFINITELY_UNSET}\"\n",
        );
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(name)) if name == "HANGWATCH_TEST_DEFINITELY_UNSET"));
    }
}
