//! Error types for the meter and its rollups

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed record in {series}: {reason}")]
    MalformedRecord { series: String, reason: String },

    #[error("Meter error: {0}")]
    Meter(String),
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;
