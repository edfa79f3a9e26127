//! Rotating attendance code
//!
//! The code shown on the rep's screen is a pure function of the session
//! seed and the current time slice: any process instance reproduces the
//! same 4-digit code from wall-clock time alone, with no stored "current
//! code" state and no coordination. Validation accepts the current slice
//! and the immediately-previous one, absorbing clock and propagation skew
//! between the rep's display and the student's submission; anything older
//! is rejected.
//!
//! The 4-digit space is intentionally small: this is a low-security,
//! verbally-shareable token for students physically present in the room,
//! not a cryptographic credential.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::Session;
use crate::validation::validate_code;

type HmacSha256 = Hmac<Sha256>;

const CODE_DIGITS: u32 = 4;

/// Index of the rotation slice containing `now`
pub fn slice_index(now: DateTime<Utc>, rotation_period: u64) -> i64 {
    let period = rotation_period.max(1) as i64;
    now.timestamp().div_euclid(period)
}

/// The code for one specific slice of a session
pub fn code_for_slice(seed: &str, slice: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(seed.as_bytes()).expect("HMAC accepts any key length");
    mac.update(&slice.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // RFC 4226 dynamic truncation
    let offset = (digest[31] & 0x0f) as usize;
    let value = u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]) & 0x7fff_ffff;

    format!("{:04}", value % 10u32.pow(CODE_DIGITS))
}

/// The currently valid code for a session
pub fn current_code(session: &Session, now: DateTime<Utc>) -> String {
    code_for_slice(&session.seed, slice_index(now, session.rotation_period))
}

/// Validate a submitted code against the current and previous slice
///
/// A closed session accepts nothing. The one-slice grace window is the
/// widest replay tolerance allowed.
pub fn is_valid(session: &Session, now: DateTime<Utc>, submitted: &str) -> bool {
    if !session.is_active() {
        return false;
    }
    let submitted = submitted.trim();
    if validate_code(submitted).is_err() {
        return false;
    }

    let slice = slice_index(now, session.rotation_period);
    submitted == code_for_slice(&session.seed, slice)
        || submitted == code_for_slice(&session.seed, slice - 1)
}

/// Seconds until the current code rotates (rep display countdown)
pub fn seconds_remaining(session: &Session, now: DateTime<Utc>) -> u64 {
    let period = session.rotation_period.max(1) as i64;
    let elapsed = now.timestamp().rem_euclid(period);
    (period - elapsed) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionStatus;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn session(rotation_period: u64) -> Session {
        Session {
            id: Uuid::new_v4(),
            school: "School of Information and Communication Technology (SICT)".to_string(),
            department: "Computer Science".to_string(),
            level: "300".to_string(),
            course_code: "CSC301".to_string(),
            rep_username: "rep1".to_string(),
            seed: "a3f1c2d4e5b6a7f8c9d0e1f2a3b4c5d6".to_string(),
            rotation_period,
            status: SessionStatus::Active,
            created_at: Utc::now(),
            closed_at: None,
            entries: Vec::new(),
        }
    }

    /// t0 aligned to a slice boundary so offsets land where expected
    fn t0() -> DateTime<Utc> {
        let base = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let aligned = base.timestamp() - base.timestamp().rem_euclid(7);
        Utc.timestamp_opt(aligned, 0).unwrap()
    }

    fn at(offset: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(offset)
    }

    #[test]
    fn test_code_is_four_digits() {
        let s = session(7);
        for offset in 0..50 {
            let code = current_code(&s, at(offset));
            assert_eq!(code.len(), 4);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_code_stable_within_slice_and_changes_at_boundary() {
        let s = session(7);
        assert_eq!(current_code(&s, at(3)), current_code(&s, at(6)));
        assert_ne!(current_code(&s, at(0)), current_code(&s, at(8)));
    }

    #[test]
    fn test_deterministic_across_instances() {
        let a = session(7);
        let mut b = a.clone();
        b.id = Uuid::new_v4(); // only seed and period matter
        assert_eq!(current_code(&a, at(3)), current_code(&b, at(3)));
    }

    #[test]
    fn test_current_and_previous_slice_accepted() {
        let s = session(7);
        let code_now = current_code(&s, at(10));
        assert!(is_valid(&s, at(10), &code_now));

        // Previous slice's code is still accepted (grace window)
        let previous = code_for_slice(&s.seed, slice_index(at(10), 7) - 1);
        assert!(is_valid(&s, at(10), &previous));

        // Two slices back is rejected
        let stale = code_for_slice(&s.seed, slice_index(at(10), 7) - 2);
        if stale != code_now && stale != previous {
            assert!(!is_valid(&s, at(10), &stale));
        }
    }

    #[test]
    fn test_code_from_same_slice_valid_later_in_slice() {
        let s = session(7);
        let code = current_code(&s, at(0));
        assert!(is_valid(&s, at(6), &code));
    }

    #[test]
    fn test_malformed_codes_rejected() {
        let s = session(7);
        assert!(!is_valid(&s, at(0), "123"));
        assert!(!is_valid(&s, at(0), "12345"));
        assert!(!is_valid(&s, at(0), "abcd"));
        assert!(!is_valid(&s, at(0), ""));
    }

    #[test]
    fn test_closed_session_rejects_everything() {
        let mut s = session(7);
        let code = current_code(&s, at(0));
        s.status = SessionStatus::Closed;
        assert!(!is_valid(&s, at(0), &code));
    }

    #[test]
    fn test_seconds_remaining_counts_down() {
        let s = session(7);
        assert_eq!(seconds_remaining(&s, at(0)), 7);
        assert_eq!(seconds_remaining(&s, at(3)), 4);
        assert_eq!(seconds_remaining(&s, at(6)), 1);
    }
}
