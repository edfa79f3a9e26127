//! In-memory remote store
//!
//! Same contract as the GitHub-backed store, held in a process-local map.
//! Used by the engine's tests and for local development without network
//! access. Version tokens are a monotonically increasing counter rendered
//! as a string, so a stale token is detected the same way a stale blob SHA
//! would be.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::store::{Document, RemoteStore, VersionToken};

/// In-memory implementation of [`RemoteStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<HashMap<String, (String, u64)>>>,
    counter: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of documents currently stored (test helper)
    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    /// Whether the store holds no documents (test helper)
    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }
}

impl RemoteStore for MemoryStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Document>> {
        let documents = self.documents.lock().await;
        Ok(documents.get(path).map(|(content, version)| Document {
            content: content.clone(),
            version: VersionToken(version.to_string()),
        }))
    }

    async fn put_if_match(
        &self,
        path: &str,
        content: &str,
        expected: &VersionToken,
        _message: &str,
    ) -> StoreResult<VersionToken> {
        let mut documents = self.documents.lock().await;
        match documents.get(path) {
            None => Err(StoreError::NotFound(path.to_string())),
            Some((_, version)) if version.to_string() != expected.0 => {
                Err(StoreError::VersionMismatch(path.to_string()))
            }
            Some(_) => {
                let version = self.next_version();
                documents.insert(path.to_string(), (content.to_string(), version));
                Ok(VersionToken(version.to_string()))
            }
        }
    }

    async fn create_if_absent(
        &self,
        path: &str,
        content: &str,
        _message: &str,
    ) -> StoreResult<VersionToken> {
        let mut documents = self.documents.lock().await;
        if documents.contains_key(path) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        let version = self.next_version();
        documents.insert(path.to_string(), (content.to_string(), version));
        Ok(VersionToken(version.to_string()))
    }

    async fn delete(
        &self,
        path: &str,
        expected: &VersionToken,
        _message: &str,
    ) -> StoreResult<()> {
        let mut documents = self.documents.lock().await;
        match documents.get(path) {
            None => Err(StoreError::NotFound(path.to_string())),
            Some((_, version)) if version.to_string() != expected.0 => {
                Err(StoreError::VersionMismatch(path.to_string()))
            }
            Some(_) => {
                documents.remove(path);
                Ok(())
            }
        }
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }
}
