//! hangwatch - main-loop hang detection watchdog
//!
//! Entry point for the hangwatch CLI.

mod cli;
mod cmd_config;
mod cmd_run;

use std::sync::OnceLock;

use clap::Parser;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use hangwatch_config::{ConfigLoader, ConfigValidator, LoggingConfig};

use cli::{Cli, Commands};
use cmd_config::handle_config_command;
use cmd_run::RunOptions;

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize tracing with console output and an optional rolling log file.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let console = if logging.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).boxed()
    };

    let file = if logging.file {
        std::fs::create_dir_all(&logging.log_dir)?;
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("hangwatch")
            .filename_suffix("log")
            .max_log_files(7)
            .build(&logging.log_dir)?;

        // Dropping the guard stops the writer thread.
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)?;
    init_tracing(&config.logging)?;

    match cli.command {
        Some(Commands::Threshold { fps, slack }) => {
            let config = hangwatch_runloop::WatchdogConfig::with_target_fps(fps).slack_ratio(slack);
            let threshold = config.threshold()?;
            println!("{:.3}ms", threshold.as_secs_f64() * 1000.0);
            Ok(())
        }
        Some(Commands::Config { action }) => handle_config_command(action, &cli.config, &config),
        command => {
            let options = match command {
                Some(Commands::Run {
                    duration,
                    hang_every,
                    hang_ms,
                    fps,
                    json,
                }) => RunOptions {
                    duration,
                    hang_every,
                    hang_ms,
                    fps,
                    json,
                },
                _ => RunOptions {
                    duration: None,
                    hang_every: None,
                    hang_ms: None,
                    fps: None,
                    json: false,
                },
            };
            for warning in ConfigValidator::validate(&config).into_result()? {
                warn!(path = %warning.path, "{}", warning.message);
            }
            cmd_run::run(config, options)
        }
    }
}
