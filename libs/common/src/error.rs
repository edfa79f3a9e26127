//! Custom error types for the common library
//!
//! This module defines the error taxonomy for the remote document store
//! that all services persist through.

use thiserror::Error;

/// Custom error type for remote store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The document does not exist at the given path
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A conditional write carried a stale version token
    #[error("Version mismatch for {0}: document was modified concurrently")]
    VersionMismatch(String),

    /// A create-only write hit an existing document
    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    /// The remote API rejected the request
    #[error("Store API error ({status}) for {path}: {message}")]
    Api {
        status: u16,
        path: String,
        message: String,
    },

    /// Network-level failure talking to the remote API
    #[error("Store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The stored document could not be decoded
    #[error("Failed to decode document at {path}: {message}")]
    Decode { path: String, message: String },

    /// Configuration error
    #[error("Store configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;
