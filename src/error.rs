//! Error types for the redo-log parser
//!
//! Defines a unified error type that distinguishes fatal parse errors from
//! the configuration/checkpoint I/O paths around them. Soft inconsistencies
//! and policy drops (see the router) are deliberately not represented here:
//! they are handled in place with a log call, never as an `Err`.

use std::fmt;
use std::io;

/// Unified error type for parser operations
#[derive(Debug)]
pub enum RedoError {
    /// Fatal parse error: a structural violation of the record/vector framing.
    /// `block`/`offset` locate the byte that failed validation.
    Parse {
        block: u64,
        offset: u32,
        detail: String,
    },
    /// I/O error reading redo blocks or checkpoint state.
    Io(io::Error),
    /// Configuration failed validation.
    Config(String),
    /// Persisted checkpoint state could not be read or written.
    Checkpoint(String),
}

impl RedoError {
    pub fn parse(block: u64, offset: u32, detail: impl Into<String>) -> Self {
        RedoError::Parse {
            block,
            offset,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for RedoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedoError::Parse { block, offset, detail } => {
                write!(f, "redo parse error at block {} offset {}: {}", block, offset, detail)
            }
            RedoError::Io(e) => write!(f, "{}", e),
            RedoError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            RedoError::Checkpoint(msg) => write!(f, "checkpoint state error: {}", msg),
        }
    }
}

impl std::error::Error for RedoError {}

impl From<io::Error> for RedoError {
    fn from(e: io::Error) -> Self {
        RedoError::Io(e)
    }
}

impl From<serde_json::Error> for RedoError {
    fn from(e: serde_json::Error) -> Self {
        RedoError::Checkpoint(e.to_string())
    }
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, RedoError>;
