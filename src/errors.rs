// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RulewardenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The subprocess could not be started at all.
    #[error("failed to spawn `{program}`: {reason}")]
    SpawnError { program: String, reason: String },

    /// The subprocess started but exited with a non-zero code.
    ///
    /// `stderr` holds the captured diagnostic output, newline-joined.
    #[error("engine exited with code {code}: {stderr}")]
    ExitError { code: i32, stderr: String },

    #[error("filesystem error on {path:?}: {reason}")]
    FilesystemError { path: PathBuf, reason: String },

    #[error("test run cancelled: subscriber disconnected")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RulewardenError>;
