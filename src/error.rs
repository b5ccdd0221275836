// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for brewfile
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON from `brew info`
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required external tool is not installed
    #[error("{tool} is not installed. Install it with:\n    $ {remedy}")]
    EnvironmentMissing { tool: String, remedy: String },

    /// An external command exited with a non-zero status
    #[error("Failed at command: {command} (exit code {code})")]
    CommandFailed { command: String, code: i32 },

    /// A tap that an operation depends on is not available locally
    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// The input manifest does not exist
    #[error("Input file {} is not found. Initialize it with:\n    $ brew-file init", .0.display())]
    ManifestNotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using brewfile's Error type
pub type Result<T> = std::result::Result<T, Error>;
