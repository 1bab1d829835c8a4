//! # Application Errors
//!
//! Everything that can go wrong outside the core: configuration files,
//! file I/O, engine construction, and chains that did not complete.

use agechain_core::ChainError;
use thiserror::Error;

/// Errors raised by the agechain binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// A configuration file is unreadable or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A core operation failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// An engine could not be constructed.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Some chains stopped early or failed to run.
    #[error("{failed} of {total} chain(s) did not complete")]
    Incomplete {
        /// Chains that stopped or failed.
        failed: usize,
        /// Chains requested.
        total: usize,
    },
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::Io(format!("CSV error: {}", e))
    }
}
