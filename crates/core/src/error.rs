//! Error types for VBI Compare

use thiserror::Error;

/// Main error type for request and naming operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid coordinate '{input}': {reason}")]
    InvalidCoordinate { input: String, reason: String },

    #[error("Invalid region: {}", .0.join("; "))]
    InvalidRegion(Vec<String>),

    #[error("Invalid request: {}", .0.join("; "))]
    InvalidRequest(Vec<String>),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Individual problems carried by validation errors.
    ///
    /// Non-validation errors yield their display text as a single entry.
    pub fn problems(&self) -> Vec<String> {
        match self {
            Error::InvalidRegion(p) | Error::InvalidRequest(p) => p.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Result type alias for VBI Compare operations
pub type Result<T> = std::result::Result<T, Error>;
