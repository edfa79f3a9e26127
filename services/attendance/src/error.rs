//! Error taxonomy for the attendance session engine
//!
//! Business-rule rejections (duplicate matric, bound device, closed
//! session) are never conflated with transient store contention: contention
//! is retried internally up to a fixed cap and then surfaced as [`Busy`],
//! a distinct "try again" condition.
//!
//! [`Busy`]: SessionError::Busy

use common::StoreError;
use thiserror::Error;

/// Errors surfaced by the session engine
#[derive(Error, Debug)]
pub enum SessionError {
    /// An active session already exists for the key (terminal for `create`)
    #[error("An attendance session is already running for {0}")]
    Conflict(String),

    /// The session is closed or absent
    #[error("No active attendance session")]
    NotActive,

    /// No entry with the given matric exists in the session
    #[error("Entry not found")]
    EntryNotFound,

    /// The matric number is already signed in this session
    #[error("Matric number {matric} is already in the attendance")]
    DuplicateMatric { matric: String },

    /// The device already signed a different matric number in this session
    #[error("This device has already signed attendance for matric {matric}")]
    AlreadyBound { matric: String },

    /// Input rejected before any store access
    #[error("{0}")]
    InvalidFormat(String),

    /// The submitted attendance code is not currently valid
    #[error("Invalid or expired attendance code")]
    InvalidCode,

    /// Store contention outlasted the retry budget
    #[error("The session is busy, please try again")]
    Busy,

    /// The archive write failed; the close is safe to retry
    #[error("Archive write failed: {0}")]
    ArchiveWriteFailed(String),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Type alias for engine results
pub type SessionResult<T> = Result<T, SessionError>;
