//! Advisor-configurable settings
//!
//! Stored as a single JSON document in the data repository. The rotation
//! period is read once per session creation; changing it never affects a
//! session that is already running.

use common::StoreError;
use common::StoreResult;
use common::store::{RemoteStore, read_json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SessionError, SessionResult};
use crate::retry::{MAX_ATTEMPTS, backoff};

pub const SETTINGS_PATH: &str = "data/settings.json";

pub const DEFAULT_TOKEN_LIFETIME: u64 = 7;

/// Longest accepted rotation period; beyond this the code stops being a
/// liveness check on physical presence
pub const MAX_TOKEN_LIFETIME: u64 = 300;

fn default_token_lifetime() -> u64 {
    DEFAULT_TOKEN_LIFETIME
}

/// Advisor-configurable settings document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Rotation period of the attendance code, in seconds
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the document is absent
    pub async fn load<S: RemoteStore>(store: &S) -> StoreResult<Self> {
        match read_json::<S, Settings>(store, SETTINGS_PATH).await? {
            Some((settings, _)) => Ok(settings),
            None => Ok(Settings::default()),
        }
    }

    /// Persist settings, retrying contention like every other mutation
    pub async fn save<S: RemoteStore>(&self, store: &S) -> SessionResult<()> {
        if self.token_lifetime == 0 || self.token_lifetime > MAX_TOKEN_LIFETIME {
            return Err(SessionError::InvalidFormat(format!(
                "token_lifetime must be between 1 and {MAX_TOKEN_LIFETIME} seconds"
            )));
        }

        let content = serde_json::to_string_pretty(self).map_err(|e| StoreError::Decode {
            path: SETTINGS_PATH.to_string(),
            message: e.to_string(),
        })?;

        for attempt in 1..=MAX_ATTEMPTS {
            let result = match store.get(SETTINGS_PATH).await? {
                Some(doc) => store
                    .put_if_match(SETTINGS_PATH, &content, &doc.version, "Update settings")
                    .await
                    .map(|_| ()),
                None => store
                    .create_if_absent(SETTINGS_PATH, &content, "Init settings")
                    .await
                    .map(|_| ()),
            };

            match result {
                Ok(()) => {
                    info!("Settings saved: token_lifetime = {}s", self.token_lifetime);
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
