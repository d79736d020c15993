//! SwapSync Error Types
//!
//! This module defines the error types used throughout the extraction pipeline.
//! It leverages the `thiserror` crate for deriving the `Error` trait and providing
//! formatted error messages.

use std::time::Duration;
use thiserror::Error;

/// Enumerates the various error types that can occur while extracting swaps
#[derive(Error, Debug)]
pub enum SwapSyncError {
    /// Configuration is missing or inconsistent. Fatal before any network activity
    #[error("Config error: {0}")]
    Config(String),

    /// A walker was handed a range whose start lies above its end
    #[error("Invalid block range: start block {start} is greater than end block {end}")]
    InvalidRange { start: u64, end: u64 },

    /// Represents errors that occur when interacting with the blockchain provider
    #[error("Source error ({source_name}): {message}")]
    Source {
        source_name: String,
        message: String,
    },

    /// An rpc call did not finish before its deadline
    #[error("Source error ({source_name}): {call} timed out after {elapsed:?}")]
    Timeout {
        source_name: String,
        call: &'static str,
        elapsed: Duration,
    },

    /// A native fixed-point value could not be rescaled into a decimal
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Persisting a record failed
    #[error("Write error: {0}")]
    Write(String),

    /// Errors surfaced by the postgres client
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),
}

impl SwapSyncError {
    pub(crate) fn source_failure(source_name: &str, message: impl std::fmt::Display) -> Self {
        SwapSyncError::Source {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }
}
