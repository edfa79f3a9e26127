//! Remote document store abstraction
//!
//! The durable source of truth for the whole application is a remote,
//! file-granularity document store with no native transactions. This module
//! models it as a versioned key→document store: every read returns a version
//! token and every write is conditional on the token still matching, so all
//! higher-level mutations can be expressed as compare-and-swap loops instead
//! of lost-update-prone read-modify-write.

use serde::de::DeserializeOwned;

use crate::error::{StoreError, StoreResult};

pub mod github;
pub mod memory;

pub use github::{GithubStore, StoreConfig};
pub use memory::MemoryStore;

/// Opaque version token returned by reads and required by conditional writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken(pub String);

impl VersionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A document read from the store together with its version token
#[derive(Debug, Clone)]
pub struct Document {
    /// UTF-8 document body
    pub content: String,
    /// Version observed at read time
    pub version: VersionToken,
}

/// Versioned key→document store with optimistic concurrency
///
/// Implementations must guarantee that `put_if_match` fails with
/// [`StoreError::VersionMismatch`] when the document changed since the
/// version was observed, and that `create_if_absent` fails with
/// [`StoreError::AlreadyExists`] when the path is already occupied. Those
/// two failure modes are what the session engine's invariants rest on.
pub trait RemoteStore: Send + Sync + 'static {
    /// Read the current document at `path`, or `None` if absent
    fn get(&self, path: &str) -> impl Future<Output = StoreResult<Option<Document>>> + Send;

    /// Replace the document at `path` iff `expected` is still the current version
    fn put_if_match(
        &self,
        path: &str,
        content: &str,
        expected: &VersionToken,
        message: &str,
    ) -> impl Future<Output = StoreResult<VersionToken>> + Send;

    /// Create the document at `path` iff nothing exists there
    fn create_if_absent(
        &self,
        path: &str,
        content: &str,
        message: &str,
    ) -> impl Future<Output = StoreResult<VersionToken>> + Send;

    /// Delete the document at `path` iff `expected` is still the current version
    fn delete(
        &self,
        path: &str,
        expected: &VersionToken,
        message: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Check that the store is reachable
    fn health_check(&self) -> impl Future<Output = StoreResult<bool>> + Send;
}

/// Read and decode a JSON document, returning the typed value with its version
pub async fn read_json<S: RemoteStore, T: DeserializeOwned>(
    store: &S,
    path: &str,
) -> StoreResult<Option<(T, VersionToken)>> {
    let Some(doc) = store.get(path).await? else {
        return Ok(None);
    };
    let value = serde_json::from_str(&doc.content).map_err(|e| StoreError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    Ok(Some((value, doc.version)))
}
