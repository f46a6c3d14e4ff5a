// Configuration Management
//
// This crate handles all configuration loading for the search chat API.
// Every setting comes from the process environment; optional settings
// fall back to defaults. Keeping this separate leaves the service and
// storage layers free of environment access.

use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
}
