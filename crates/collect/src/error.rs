//! Error types for collection jobs.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a collection job or batch run.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Cloud(#[from] vbicompare_cloud::CloudError),

    #[error("{0}")]
    Core(#[from] vbicompare_core::Error),

    #[error("invalid config file {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("no tile scheme GeoPackage found under '{0}'")]
    NoTileScheme(String),

    #[error("failed to start runtime: {0}")]
    Runtime(String),

    #[error("failed to run {script}: {reason}")]
    Script { script: PathBuf, reason: String },
}

/// Result alias for collection operations.
pub type Result<T> = std::result::Result<T, CollectError>;
