//! Archive exporter
//!
//! On close, the finalized entry set is rendered as CSV and written to the
//! archive repository under a deterministic path. The write is create-only:
//! a name collision is an error, never a silent overwrite or merge.

use std::sync::Arc;

use common::StoreError;
use common::store::RemoteStore;
use tracing::{error, info};

use crate::error::{SessionError, SessionResult};
use crate::futo::to_futo;
use crate::models::{Entry, Session};

/// CSV header, exactly as consumed downstream
pub const CSV_HEADER: &str = "S/N,Surname,Other Names,Matric Number,Time";

/// Writes finalized attendance CSVs to the archive store
#[derive(Clone)]
pub struct ArchiveExporter<S> {
    store: Arc<S>,
}

impl<S: RemoteStore> ArchiveExporter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Render and write the session's CSV; returns the archive path
    ///
    /// `allow_existing` is set when retrying the archive step of a close
    /// that already persisted its terminal state: hitting an existing file
    /// then means a previous attempt got through, not a collision.
    pub async fn export(&self, session: &Session, allow_existing: bool) -> SessionResult<String> {
        let path = archive_path(session);
        let csv = render_csv(&session.entries);
        let message = format!(
            "Attendance: {} | {} | Level {} | {}",
            session.course_code,
            session.department,
            session.level,
            to_futo(session.created_at).format("%Y-%m-%d"),
        );

        match self.store.create_if_absent(&path, &csv, &message).await {
            Ok(_) => {
                info!(
                    "Archived {} entries for {} to {}",
                    session.entries.len(),
                    session.course_code,
                    path
                );
                Ok(path)
            }
            Err(StoreError::AlreadyExists(_)) if allow_existing => {
                info!("Archive already present at {}, not rewritten", path);
                Ok(path)
            }
            Err(StoreError::AlreadyExists(_)) => {
                error!("Archive name collision at {}", path);
                Err(SessionError::ArchiveWriteFailed(format!(
                    "archive already exists at {path}"
                )))
            }
            Err(e) => {
                error!("Archive write failed for {}: {}", path, e);
                Err(SessionError::ArchiveWriteFailed(e.to_string()))
            }
        }
    }
}

/// Render entries as CSV, one row per entry in signed order
///
/// S/N is the 1-based position in the order entries were signed.
pub fn render_csv(entries: &[Entry]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for (i, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            i + 1,
            csv_field(&entry.surname),
            csv_field(&entry.other_names),
            csv_field(&entry.matric),
            csv_field(&entry.signed_at),
        ));
    }
    out
}

/// Quote a field when it contains a delimiter, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Deterministic archive path for a session
///
/// `<SCHOOL-ACRONYM>/<department>/<COURSECODE>_<department-slug>_<YYYY-MM-DD>_<HH-MM>.csv`
/// with date and start time in the institution timezone.
pub fn archive_path(session: &Session) -> String {
    let started = to_futo(session.created_at);
    format!(
        "{}/{}/{}_{}_{}_{}.csv",
        school_acronym(&session.school),
        session.department.replace([' ', '/'], "_").replace(['(', ')'], ""),
        session.course_code,
        department_slug(&session.department),
        started.format("%Y-%m-%d"),
        started.format("%H-%M"),
    )
}

/// Acronym for a school name: the parenthesized tail, or a derived fallback
pub fn school_acronym(school: &str) -> String {
    if let (Some(open), Some(close)) = (school.rfind('('), school.rfind(')')) {
        if open < close {
            return school[open + 1..close].to_uppercase();
        }
    }
    school.chars().take(4).collect::<String>().to_uppercase()
}

/// Lowercase hyphenated slug of a department name
pub fn department_slug(department: &str) -> String {
    department
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
