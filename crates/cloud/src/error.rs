//! Error types for the remote data sources.

use thiserror::Error;

/// Errors produced while talking to the NOAA services and buckets.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service error {code}: {message}")]
    Service { code: i64, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid GeoPackage: {0}")]
    GeoPackage(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(#[from] vbicompare_core::Error),
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
