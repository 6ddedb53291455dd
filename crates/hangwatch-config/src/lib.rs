//! Configuration management for hangwatch.
//!
//! Loads `Config` from TOML with `${VAR}` substitution and validates it
//! before the watchdog and run loop are built from it.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
