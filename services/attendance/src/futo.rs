//! Institution timezone helpers
//!
//! FUTO runs on a fixed UTC+1 offset year-round; all timestamps shown to
//! students and written to archives use it.

use chrono::{DateTime, FixedOffset, Utc};

const OFFSET_SECONDS: i32 = 3600;

/// The institution's fixed UTC+1 offset
pub fn futo_offset() -> FixedOffset {
    FixedOffset::east_opt(OFFSET_SECONDS).expect("valid fixed offset")
}

/// Current wall-clock time in the institution timezone
pub fn futo_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&futo_offset())
}

/// Current wall-clock time rendered as "YYYY-MM-DD HH:MM:SS"
pub fn futo_now_str() -> String {
    futo_now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Render a UTC instant in the institution timezone
pub fn to_futo(instant: DateTime<Utc>) -> DateTime<FixedOffset> {
    instant.with_timezone(&futo_offset())
}
