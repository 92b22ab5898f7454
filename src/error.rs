//! Error types for bq-bench.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for benchmark operations.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Query discovery errors (malformed glob pattern, unlistable directory).
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Query file read errors (permission denied, invalid UTF-8, etc.)
    #[error("Read error: {0}")]
    Read(String),

    /// Output errors (directory or file creation, row writes).
    #[error("I/O error: {0}")]
    Io(String),

    /// Query engine errors (submission, row fetch, dry-run job status).
    #[error("Engine error: {0}")]
    Engine(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Batch-level failure raised after every query has been attempted.
    #[error("{failed} of {total} queries failed")]
    Batch { failed: usize, total: usize },
}

impl BenchError {
    /// Creates a discovery error with the given message.
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Creates a read error with the given message.
    pub fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    /// Creates an I/O error with the given message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Creates an engine error with the given message.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "Discovery Error",
            Self::Read(_) => "Read Error",
            Self::Io(_) => "I/O Error",
            Self::Engine(_) => "Engine Error",
            Self::Config(_) => "Configuration Error",
            Self::Batch { .. } => "Batch Error",
        }
    }
}

/// Result type alias using BenchError.
pub type Result<T> = std::result::Result<T, BenchError>;
