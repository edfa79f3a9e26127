//! Entry model and related functionality

use serde::{Deserialize, Serialize};

/// One student's signed attendance row
///
/// Name fields are stored normalized (surname upper-case, other names
/// title-case); the matric number is the dedup key within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub surname: String,
    pub other_names: String,
    pub matric: String,
    /// Wall-clock sign-in time, institution timezone (UTC+1)
    pub signed_at: String,
}

/// Raw entry fields as submitted, before validation and normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDraft {
    pub surname: String,
    pub other_names: String,
    pub matric: String,
}
