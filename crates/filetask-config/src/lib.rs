//! # filetask Config
//!
//! Configuration management for the filetask service: TOML schema with
//! per-field defaults, `${VAR}` expansion on load, and validation.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
