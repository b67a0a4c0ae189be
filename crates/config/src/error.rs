//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("Failed to read file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("Failed to write file at {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration
    #[error("Failed to serialize TOML config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A numeric setting must be positive
    #[error("Invalid {name}: must be positive, got {value}")]
    NotPositive { name: &'static str, value: u64 },

    /// Invalid socket address format
    #[error("Invalid socket address format: {0}")]
    InvalidSocketAddr(String),

    /// Invalid start signature
    #[error("Invalid start signature: {0}")]
    InvalidStartSignature(String),

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Invalid log format
    #[error("Invalid log format: {0}. Valid values: text, json, compact")]
    InvalidLogFormat(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
