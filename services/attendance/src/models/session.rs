//! Session model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Entry;

/// Identifies the single attendance slot for one class
///
/// At most one session document exists per key at any time; its presence
/// with `status = Active` is the "attendance is running" signal students
/// poll for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub school: String,
    pub department: String,
    pub level: String,
}

impl SessionKey {
    pub fn new(
        school: impl Into<String>,
        department: impl Into<String>,
        level: impl Into<String>,
    ) -> Self {
        Self {
            school: school.into(),
            department: department.into(),
            level: level.into(),
        }
    }

    /// Storage path of the active session document for this key
    pub fn storage_path(&self) -> String {
        format!(
            "sessions/{}__{}__{}.json",
            slug(&self.school),
            slug(&self.department),
            slug(&self.level)
        )
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {} / L{}", self.school, self.department, self.level)
    }
}

/// Sanitize a key component for use in a storage path
fn slug(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | ' ' => '_',
            _ => c,
        })
        .filter(|c| *c != '(' && *c != ')')
        .collect()
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Closed,
}

/// Session entity
///
/// The seed is fixed at creation and drives the rotating attendance code;
/// the rotation period is copied from the advisor settings at creation time
/// and never changes for the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub school: String,
    pub department: String,
    pub level: String,
    pub course_code: String,
    pub rep_username: String,
    /// Opaque random value keying the code rotation; never exposed to students
    pub seed: String,
    /// Rotation period in seconds, immutable for the session's lifetime
    pub rotation_period: u64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub entries: Vec<Entry>,
}

impl Session {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(
            self.school.clone(),
            self.department.clone(),
            self.level.clone(),
        )
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Storage path of the device binding document for this session
    pub fn device_map_path(&self) -> String {
        device_map_path(self.id)
    }

    /// Storage path of the finalized record written at close
    pub fn closed_record_path(&self) -> String {
        closed_record_path(self.id)
    }
}

/// Storage path of a session's device binding document by id
pub fn device_map_path(session_id: Uuid) -> String {
    format!("devices/{}.json", session_id)
}

/// Storage path of a finalized session record by id
pub fn closed_record_path(session_id: Uuid) -> String {
    format!("closed/{}.json", session_id)
}

/// Finalized session record persisted before the active slot is freed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedSession {
    pub session: Session,
    /// Archive path the CSV was written to
    pub archive_path: String,
}
