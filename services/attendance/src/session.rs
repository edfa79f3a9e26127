//! Session lifecycle management
//!
//! The session manager owns the absent → active → closed state machine and
//! serializes every mutation through the store's conditional writes. No
//! in-process lock guards business state: instances of this service may run
//! in separate processes, and correctness rests entirely on version-token
//! compare-and-swap against the remote store. Every mutation is a bounded
//! read → check → conditional-write loop whose checks are redone against a
//! fresh read on each retry.

use std::sync::Arc;

use chrono::Utc;
use common::StoreError;
use common::store::{RemoteStore, VersionToken, read_json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::archive::ArchiveExporter;
use crate::device::DeviceGuard;
use crate::error::{SessionError, SessionResult};
use crate::futo::futo_now_str;
use crate::models::session::closed_record_path;
use crate::models::{ClosedSession, Entry, EntryDraft, Session, SessionKey, SessionStatus};
use crate::retry::{MAX_ATTEMPTS, backoff};
use crate::settings::Settings;
use crate::token;
use crate::validation::{
    normalize_other_names, normalize_surname, validate_matric, validate_name,
};

/// Manages attendance session lifecycle against the remote store
#[derive(Clone)]
pub struct SessionManager<S> {
    store: Arc<S>,
    device_guard: DeviceGuard<S>,
    exporter: ArchiveExporter<S>,
}

impl<S: RemoteStore> SessionManager<S> {
    /// Create a new session manager
    ///
    /// `store` holds live session state; `archive_store` receives the
    /// finalized CSVs (a different repository in production).
    pub fn new(store: Arc<S>, archive_store: Arc<S>) -> Self {
        Self {
            device_guard: DeviceGuard::new(store.clone()),
            exporter: ArchiveExporter::new(archive_store),
            store,
        }
    }

    /// Start a new attendance session for a key
    ///
    /// The one-active-session-per-key invariant is enforced by a
    /// create-only write: whoever lands the document first wins, everyone
    /// else observes `Conflict`. That conflict is a business outcome, not a
    /// transient condition, so there is no retry.
    pub async fn create(
        &self,
        key: &SessionKey,
        course_code: &str,
        rep_username: &str,
    ) -> SessionResult<Session> {
        validate_name(&key.school, "School").map_err(SessionError::InvalidFormat)?;
        validate_name(&key.department, "Department").map_err(SessionError::InvalidFormat)?;
        validate_name(&key.level, "Level").map_err(SessionError::InvalidFormat)?;

        let course_code = course_code.trim().to_uppercase();
        if course_code.is_empty() {
            return Err(SessionError::InvalidFormat(
                "Course code is required".to_string(),
            ));
        }

        // Rotation period is copied from settings once, at creation time
        let settings = Settings::load(&*self.store).await?;

        let session = Session {
            id: Uuid::new_v4(),
            school: key.school.clone(),
            department: key.department.clone(),
            level: key.level.clone(),
            course_code: course_code.clone(),
            rep_username: rep_username.to_string(),
            seed: Uuid::new_v4().simple().to_string(),
            rotation_period: settings.token_lifetime,
            status: SessionStatus::Active,
            created_at: Utc::now(),
            closed_at: None,
            entries: Vec::new(),
        };

        let message = format!(
            "Start session: {} {} L{}",
            course_code, key.department, key.level
        );
        match self
            .store
            .create_if_absent(&key.storage_path(), &serialize(&session)?, &message)
            .await
        {
            Ok(_) => {
                info!("Session {} started for {}", session.id, key);
                Ok(session)
            }
            Err(StoreError::AlreadyExists(_)) => {
                warn!("Session create rejected for {}: slot occupied", key);
                Err(SessionError::Conflict(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the session document for a key, if any (student poll, rep reconnect)
    pub async fn fetch(&self, key: &SessionKey) -> SessionResult<Option<Session>> {
        Ok(read_json::<S, Session>(&*self.store, &key.storage_path())
            .await?
            .map(|(session, _)| session))
    }

    /// Validate a submitted code and append the student's entry
    pub async fn sign_in(
        &self,
        key: &SessionKey,
        code: &str,
        draft: &EntryDraft,
        device_id: &str,
    ) -> SessionResult<Entry> {
        let (session, _) = self.load_active(key).await?;
        if !token::is_valid(&session, Utc::now(), code) {
            return Err(SessionError::InvalidCode);
        }
        self.add_entry(key, draft, device_id).await
    }

    /// Append an entry to the active session
    ///
    /// Order of checks: format validation (no store access on bad input),
    /// device guard (fails fast on a bound device), matric uniqueness, then
    /// the conditional append. On contention everything after the fresh
    /// read is redone.
    pub async fn add_entry(
        &self,
        key: &SessionKey,
        draft: &EntryDraft,
        device_id: &str,
    ) -> SessionResult<Entry> {
        let (surname, other_names, matric) = normalize_draft(draft)?;

        for attempt in 1..=MAX_ATTEMPTS {
            let (mut session, version) = self.load_active(key).await?;

            self.device_guard
                .bind(session.id, device_id, &matric)
                .await?;

            if session.entries.iter().any(|e| e.matric == matric) {
                return Err(SessionError::DuplicateMatric { matric });
            }

            let entry = Entry {
                surname: surname.clone(),
                other_names: other_names.clone(),
                matric: matric.clone(),
                signed_at: futo_now_str(),
            };
            session.entries.push(entry.clone());

            match self.put_session(key, &session, &version).await {
                Ok(()) => {
                    info!(
                        "Entry {} recorded in session {} ({} total)",
                        entry.matric,
                        session.id,
                        session.entries.len()
                    );
                    return Ok(entry);
                }
                Err(SessionError::Store(StoreError::VersionMismatch(_))) => {
                    backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!("Entry append for {} exhausted retry budget", key);
        Err(SessionError::Busy)
    }

    /// Rewrite the entry identified by `matric` (rep correction path)
    pub async fn edit_entry(
        &self,
        key: &SessionKey,
        matric: &str,
        draft: &EntryDraft,
    ) -> SessionResult<Entry> {
        let (surname, other_names, new_matric) = normalize_draft(draft)?;
        let matric = matric.trim();

        for attempt in 1..=MAX_ATTEMPTS {
            let (mut session, version) = self.load_active(key).await?;

            // The corrected matric must not collide with any other entry
            if new_matric != matric
                && session.entries.iter().any(|e| e.matric == new_matric)
            {
                return Err(SessionError::DuplicateMatric { matric: new_matric });
            }

            let Some(entry) = session.entries.iter_mut().find(|e| e.matric == matric) else {
                return Err(SessionError::EntryNotFound);
            };
            entry.surname = surname.clone();
            entry.other_names = other_names.clone();
            entry.matric = new_matric.clone();
            let updated = entry.clone();

            match self.put_session(key, &session, &version).await {
                Ok(()) => {
                    info!("Entry {} edited in session {}", matric, session.id);
                    return Ok(updated);
                }
                Err(SessionError::Store(StoreError::VersionMismatch(_))) => {
                    backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(SessionError::Busy)
    }

    /// Remove the entry identified by `matric` (rep only, active sessions only)
    pub async fn delete_entry(&self, key: &SessionKey, matric: &str) -> SessionResult<()> {
        let matric = matric.trim();

        for attempt in 1..=MAX_ATTEMPTS {
            let (mut session, version) = self.load_active(key).await?;

            let before = session.entries.len();
            session.entries.retain(|e| e.matric != matric);
            if session.entries.len() == before {
                return Err(SessionError::EntryNotFound);
            }

            match self.put_session(key, &session, &version).await {
                Ok(()) => {
                    info!("Entry {} removed from session {}", matric, session.id);
                    return Ok(());
                }
                Err(SessionError::Store(StoreError::VersionMismatch(_))) => {
                    backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(SessionError::Busy)
    }

    /// Close the session: persist the terminal state, archive, free the slot
    ///
    /// The archive is written before the active slot is freed, so a failed
    /// archive never loses entry data — the closed session stays readable
    /// at its key and `close` is safe to retry. A second close after the
    /// terminal state was persisted returns the same result without a
    /// second archive write.
    pub async fn close(&self, key: &SessionKey, session_id: Uuid) -> SessionResult<ClosedSession> {
        // Idempotent re-close: the finalized record is the terminal answer.
        // An earlier close may have died after persisting the record but
        // before releasing the slot, so the release is always re-attempted.
        let record_path = closed_record_path(session_id);
        if let Some((record, _)) =
            read_json::<S, ClosedSession>(&*self.store, &record_path).await?
        {
            self.free_slot(key, session_id).await?;
            info!("Session {} already closed, returning record", session_id);
            return Ok(record);
        }

        let (session, was_already_closed) = self.mark_closed(key, session_id).await?;

        // A close that already reached Closed state may also have archived
        let archive_path = self.exporter.export(&session, was_already_closed).await?;

        let record = ClosedSession {
            session: session.clone(),
            archive_path,
        };
        match self
            .store
            .create_if_absent(
                &record_path,
                &serialize(&record)?,
                &format!("Close session: {} L{}", key.department, key.level),
            )
            .await
        {
            Ok(_) | Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }

        self.free_slot(key, session_id).await?;
        info!("Session {} closed and archived for {}", session_id, key);
        Ok(record)
    }

    // ── Internals ─────────────────────────────────────────────────────

    /// Read the session at `key`, requiring it to exist and be active
    async fn load_active(&self, key: &SessionKey) -> SessionResult<(Session, VersionToken)> {
        let Some((session, version)) =
            read_json::<S, Session>(&*self.store, &key.storage_path()).await?
        else {
            return Err(SessionError::NotActive);
        };
        if !session.is_active() {
            return Err(SessionError::NotActive);
        }
        Ok((session, version))
    }

    async fn put_session(
        &self,
        key: &SessionKey,
        session: &Session,
        version: &VersionToken,
    ) -> SessionResult<()> {
        let message = format!(
            "Session update: {} {} L{}",
            session.course_code, key.department, key.level
        );
        self.store
            .put_if_match(&key.storage_path(), &serialize(session)?, version, &message)
            .await?;
        Ok(())
    }

    /// Flip the session document to Closed, stamping closed_at
    ///
    /// Returns the closed session and whether an earlier close attempt had
    /// already persisted the terminal state.
    async fn mark_closed(
        &self,
        key: &SessionKey,
        session_id: Uuid,
    ) -> SessionResult<(Session, bool)> {
        for attempt in 1..=MAX_ATTEMPTS {
            let Some((mut session, version)) =
                read_json::<S, Session>(&*self.store, &key.storage_path()).await?
            else {
                return Err(SessionError::NotActive);
            };
            if session.id != session_id {
                // The slot has been recycled by a newer session
                return Err(SessionError::NotActive);
            }
            if session.status == SessionStatus::Closed {
                return Ok((session, true));
            }

            session.status = SessionStatus::Closed;
            session.closed_at = Some(Utc::now());

            match self.put_session(key, &session, &version).await {
                Ok(()) => return Ok((session, false)),
                Err(SessionError::Store(StoreError::VersionMismatch(_))) => {
                    backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(SessionError::Busy)
    }

    /// Delete the key document, releasing the active-session slot
    async fn free_slot(&self, key: &SessionKey, session_id: Uuid) -> SessionResult<()> {
        let message = format!("End session: {} L{}", key.department, key.level);
        for attempt in 1..=MAX_ATTEMPTS {
            let Some((session, version)) =
                read_json::<S, Session>(&*self.store, &key.storage_path()).await?
            else {
                return Ok(()); // already freed
            };
            if session.id != session_id {
                return Ok(()); // slot already recycled
            }

            match self
                .store
                .delete(&key.storage_path(), &version, &message)
                .await
            {
                Ok(()) => return Ok(()),
                Err(StoreError::NotFound(_)) => return Ok(()),
                Err(StoreError::VersionMismatch(_)) => backoff(attempt).await,
                Err(e) => return Err(e.into()),
            }
        }
        Err(SessionError::Busy)
    }
}

fn normalize_draft(draft: &EntryDraft) -> SessionResult<(String, String, String)> {
    validate_name(&draft.surname, "Surname").map_err(SessionError::InvalidFormat)?;
    validate_name(&draft.other_names, "Other names").map_err(SessionError::InvalidFormat)?;
    validate_matric(&draft.matric).map_err(SessionError::InvalidFormat)?;
    Ok((
        normalize_surname(&draft.surname),
        normalize_other_names(&draft.other_names),
        draft.matric.trim().to_string(),
    ))
}

fn serialize<T: serde::Serialize>(value: &T) -> SessionResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        SessionError::Store(StoreError::Decode {
            path: "<serialize>".to_string(),
            message: e.to_string(),
        })
    })
}
