//! Error types for the analysis core.
//!
//! Errors only surface while building the pipeline (configuration and sample
//! buffers). Once ticking, every degenerate condition is absorbed
//! into a defined fallback value instead.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration problems detected while loading or validating tables.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`crate::config::Config`]
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A calibration table does not have one entry per band
    #[error("table `{table}` has {actual} entries, expected {expected}")]
    TableLength {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A numeric parameter is outside its accepted range
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Errors raised while constructing analysis components.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sample data or rate that cannot be analyzed
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
