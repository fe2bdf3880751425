//! Error types for WgAdmin

use thiserror::Error;

/// Result type alias using WgAdmin Error
pub type Result<T> = std::result::Result<T, Error>;

/// WgAdmin error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Resource already exists: {kind} with id {id}")]
    AlreadyExists { kind: String, id: String },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Address pool {0} exhausted")]
    AddressPoolExhausted(String),

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}
