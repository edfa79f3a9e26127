//! Common library for the ULAS application
//!
//! This crate provides shared functionality used across the ULAS services,
//! including the versioned remote document store, error handling, and other
//! common utilities.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{Document, RemoteStore, VersionToken};
