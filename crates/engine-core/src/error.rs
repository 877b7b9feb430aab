//! Error types for the checkpoint persistence engine

use thiserror::Error;

/// Result type alias using the engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the checkpoint persistence engine
#[derive(Error, Debug)]
pub enum Error {
    // I/O errors (propagated, never retried by this layer)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Load errors
    #[error("No checkpoint payload found in {dir}")]
    MissingPayload { dir: String },

    #[error("No metadata.json found in {dir}")]
    MissingMetadata { dir: String },

    // Integrity errors
    #[error("Digest mismatch for {path}: expected {expected}, computed {actual}")]
    Integrity {
        path: String,
        expected: String,
        actual: String,
    },

    // Schema errors
    #[error("Schema error: {message}")]
    Schema { message: String },

    // Canonical encoding errors
    #[error("Encode error: {message}")]
    Encode { message: String },

    // Retention policy errors
    #[error("Invalid retention spec: {message}")]
    Retention { message: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if this error indicates an absent (not corrupt) checkpoint
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            Error::MissingPayload { .. } | Error::MissingMetadata { .. }
        )
    }

    /// Returns true if this error indicates a fatal integrity or schema problem
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Integrity { .. } | Error::Schema { .. } | Error::Encode { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
