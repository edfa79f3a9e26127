//! Device guard: one device signs at most one matric number per session
//!
//! Bindings live in a per-session document keyed by the session id and are
//! first-write-wins. Re-submitting the same matric from the same device is
//! an idempotent success; a different matric fails with the already-bound
//! matric so an operator can see what happened. There is no unbind path
//! exposed to students.

use std::sync::Arc;

use common::store::{RemoteStore, read_json};
use common::StoreError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};
use crate::models::DeviceMap;
use crate::models::session::device_map_path;
use crate::retry::{MAX_ATTEMPTS, backoff};

/// Enforces the one-matric-per-device rule for a session
#[derive(Clone)]
pub struct DeviceGuard<S> {
    store: Arc<S>,
}

impl<S: RemoteStore> DeviceGuard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Bind `device_id` to `matric` within the session, first write wins
    ///
    /// An empty device id means the caller had no device signal; the bind
    /// is skipped (matric dedup still applies downstream).
    pub async fn bind(&self, session_id: Uuid, device_id: &str, matric: &str) -> SessionResult<()> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Ok(());
        }
        let matric = matric.trim();
        let path = device_map_path(session_id);

        for attempt in 1..=MAX_ATTEMPTS {
            let existing = read_json::<S, DeviceMap>(&*self.store, &path).await?;
            let (mut map, version) = match existing {
                Some((map, version)) => (map, Some(version)),
                None => (DeviceMap::default(), None),
            };

            match map.get(device_id) {
                Some(bound) if bound == matric => return Ok(()), // idempotent re-submit
                Some(bound) => {
                    warn!(
                        "Device rejected for session {}: already bound to another matric",
                        session_id
                    );
                    return Err(SessionError::AlreadyBound {
                        matric: bound.to_string(),
                    });
                }
                None => {}
            }

            map.insert(device_id.to_string(), matric.to_string());
            let content = serde_json::to_string_pretty(&map).map_err(|e| StoreError::Decode {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let message = format!("Device binding: session {}", session_id);

            let result = match version {
                Some(version) => self
                    .store
                    .put_if_match(&path, &content, &version, &message)
                    .await
                    .map(|_| ()),
                None => self
                    .store
                    .create_if_absent(&path, &content, &message)
                    .await
                    .map(|_| ()),
            };

            match result {
                Ok(()) => {
                    info!("Device bound for session {}", session_id);
                    return Ok(());
                }
                Err(StoreError::VersionMismatch(_)) | Err(StoreError::AlreadyExists(_)) => {
                    backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SessionError::Busy)
    }
}
