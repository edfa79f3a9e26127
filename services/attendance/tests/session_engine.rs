//! End-to-end engine tests over the in-memory store
//!
//! These exercise the full session lifecycle the way the HTTP handlers do:
//! create, sign with the rotating code, rep corrections, close with CSV
//! archival, and the concurrency invariants around the single active slot.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use attendance::archive::CSV_HEADER;
use attendance::error::SessionError;
use attendance::models::session::closed_record_path;
use attendance::models::{ClosedSession, EntryDraft, Session, SessionKey};
use attendance::session::SessionManager;
use attendance::token;
use common::store::{MemoryStore, RemoteStore};

struct Harness {
    manager: SessionManager<MemoryStore>,
    data: Arc<MemoryStore>,
    archive: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let data = Arc::new(MemoryStore::new());
    let archive = Arc::new(MemoryStore::new());
    Harness {
        manager: SessionManager::new(data.clone(), archive.clone()),
        data,
        archive,
    }
}

fn key() -> SessionKey {
    SessionKey::new(
        "School of Information and Communication Technology (SICT)",
        "Computer Science",
        "300",
    )
}

fn draft(surname: &str, other: &str, matric: &str) -> EntryDraft {
    EntryDraft {
        surname: surname.to_string(),
        other_names: other.to_string(),
        matric: matric.to_string(),
    }
}

#[tokio::test]
async fn test_create_then_fetch() {
    let h = harness();
    let session = h.manager.create(&key(), "csc301", "rep1").await.unwrap();

    // Course code is normalized at creation
    assert_eq!(session.course_code, "CSC301");
    assert!(session.is_active());
    assert!(session.entries.is_empty());

    let fetched = h.manager.fetch(&key()).await.unwrap().unwrap();
    assert_eq!(fetched.id, session.id);
}

#[tokio::test]
async fn test_second_create_for_same_key_conflicts() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();

    let err = h.manager.create(&key(), "CSC302", "rep2").await.unwrap_err();
    assert!(matches!(err, SessionError::Conflict(_)));
}

#[tokio::test]
async fn test_different_keys_run_independently() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();

    let other = SessionKey::new(
        "School of Information and Communication Technology (SICT)",
        "Information Technology",
        "300",
    );
    h.manager.create(&other, "IFT301", "rep2").await.unwrap();
}

#[tokio::test]
async fn test_concurrent_creates_admit_exactly_one() {
    let h = harness();

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = h.manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .create(&key(), "CSC301", &format!("rep{i}"))
                .await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(SessionError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn test_sign_with_valid_code_records_normalized_entry() {
    let h = harness();
    let session = h.manager.create(&key(), "CSC301", "rep1").await.unwrap();
    let code = token::current_code(&session, Utc::now());

    let entry = h
        .manager
        .sign_in(
            &key(),
            &code,
            &draft("okafor", "chukwuemeka john", "20200123456"),
            "dev_a",
        )
        .await
        .unwrap();

    assert_eq!(entry.surname, "OKAFOR");
    assert_eq!(entry.other_names, "Chukwuemeka John");
    assert_eq!(entry.matric, "20200123456");

    let fetched = h.manager.fetch(&key()).await.unwrap().unwrap();
    assert_eq!(fetched.entries.len(), 1);
}

#[tokio::test]
async fn test_sign_with_wrong_code_rejected() {
    let h = harness();
    let session = h.manager.create(&key(), "CSC301", "rep1").await.unwrap();
    let valid = token::current_code(&session, Utc::now());
    let wrong = if valid == "0000" { "0001" } else { "0000" };

    let err = h
        .manager
        .sign_in(&key(), wrong, &draft("OKAFOR", "John", "20200123456"), "dev_a")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidCode));

    let fetched = h.manager.fetch(&key()).await.unwrap().unwrap();
    assert!(fetched.entries.is_empty());
}

#[tokio::test]
async fn test_duplicate_matric_rejected_even_with_different_names() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();

    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "dev_a")
        .await
        .unwrap();

    let err = h
        .manager
        .add_entry(&key(), &draft("Okafor", "JOHN", "20200123456"), "dev_b")
        .await
        .unwrap_err();
    match err {
        SessionError::DuplicateMatric { matric } => assert_eq!(matric, "20200123456"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_device_bound_to_one_matric_per_session() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();

    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "dev_a")
        .await
        .unwrap();

    // Same device, different student
    let err = h
        .manager
        .add_entry(&key(), &draft("ADEYEMI", "Funke", "20209999999"), "dev_a")
        .await
        .unwrap_err();
    match err {
        SessionError::AlreadyBound { matric } => assert_eq!(matric, "20200123456"),
        other => panic!("unexpected error: {other}"),
    }

    // Re-submitting the same student from the same device stays a dedup, not a device error
    let err = h
        .manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "dev_a")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::DuplicateMatric { .. }));
}

#[tokio::test]
async fn test_invalid_matric_never_touches_the_session() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();

    let err = h
        .manager
        .add_entry(&key(), &draft("OKAFOR", "John", "2020012345"), "dev_a")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidFormat(_)));

    let fetched = h.manager.fetch(&key()).await.unwrap().unwrap();
    assert!(fetched.entries.is_empty());
}

#[tokio::test]
async fn test_edit_entry_rewrites_fields() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();
    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "")
        .await
        .unwrap();

    let updated = h
        .manager
        .edit_entry(
            &key(),
            "20200123456",
            &draft("okafor", "chukwuemeka", "20200654321"),
        )
        .await
        .unwrap();
    assert_eq!(updated.surname, "OKAFOR");
    assert_eq!(updated.other_names, "Chukwuemeka");
    assert_eq!(updated.matric, "20200654321");

    let fetched = h.manager.fetch(&key()).await.unwrap().unwrap();
    assert_eq!(fetched.entries.len(), 1);
    assert_eq!(fetched.entries[0].matric, "20200654321");
}

#[tokio::test]
async fn test_edit_entry_rejects_colliding_matric() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();
    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "")
        .await
        .unwrap();
    h.manager
        .add_entry(&key(), &draft("ADEYEMI", "Funke", "20209999999"), "")
        .await
        .unwrap();

    let err = h
        .manager
        .edit_entry(&key(), "20209999999", &draft("ADEYEMI", "Funke", "20200123456"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::DuplicateMatric { .. }));
}

#[tokio::test]
async fn test_edit_missing_entry_not_found() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();

    let err = h
        .manager
        .edit_entry(&key(), "20200123456", &draft("OKAFOR", "John", "20200123456"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::EntryNotFound));
}

#[tokio::test]
async fn test_delete_entry() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();
    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "")
        .await
        .unwrap();

    h.manager.delete_entry(&key(), "20200123456").await.unwrap();

    let fetched = h.manager.fetch(&key()).await.unwrap().unwrap();
    assert!(fetched.entries.is_empty());

    let err = h.manager.delete_entry(&key(), "20200123456").await.unwrap_err();
    assert!(matches!(err, SessionError::EntryNotFound));
}

#[tokio::test]
async fn test_close_archives_and_frees_the_slot() {
    let h = harness();
    let session = h.manager.create(&key(), "CSC301", "rep1").await.unwrap();
    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "")
        .await
        .unwrap();
    h.manager
        .add_entry(&key(), &draft("ADEYEMI", "Funke", "20209999999"), "")
        .await
        .unwrap();

    let record = h.manager.close(&key(), session.id).await.unwrap();
    assert_eq!(record.session.entries.len(), 2);

    // CSV landed in the archive store with rows in signed order
    let doc = h.archive.get(&record.archive_path).await.unwrap().unwrap();
    let mut lines = doc.content.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER));
    assert!(lines.next().unwrap().starts_with("1,OKAFOR,John,20200123456,"));
    assert!(lines.next().unwrap().starts_with("2,ADEYEMI,Funke,20209999999,"));

    // The slot is free again
    assert!(h.manager.fetch(&key()).await.unwrap().is_none());
    h.manager.create(&key(), "CSC302", "rep1").await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent_without_second_archive() {
    let h = harness();
    let session = h.manager.create(&key(), "CSC301", "rep1").await.unwrap();
    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "")
        .await
        .unwrap();

    let first = h.manager.close(&key(), session.id).await.unwrap();
    let second = h.manager.close(&key(), session.id).await.unwrap();

    assert_eq!(first.archive_path, second.archive_path);
    assert_eq!(first.session.id, second.session.id);
    assert_eq!(h.archive.len().await, 1);
}

#[tokio::test]
async fn test_close_retry_frees_slot_after_partial_close() {
    let h = harness();
    let session = h.manager.create(&key(), "CSC301", "rep1").await.unwrap();
    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "")
        .await
        .unwrap();

    // Simulate a close that persisted its terminal state and record but
    // died before releasing the slot: flip the key document to Closed and
    // write the finalized record by hand.
    let path = key().storage_path();
    let doc = h.data.get(&path).await.unwrap().unwrap();
    let mut stored: serde_json::Value = serde_json::from_str(&doc.content).unwrap();
    stored["status"] = serde_json::json!("closed");
    h.data
        .put_if_match(&path, &stored.to_string(), &doc.version, "mark closed")
        .await
        .unwrap();

    let closed: Session = serde_json::from_value(stored).unwrap();
    let archive_path = "SICT/Computer_Science/CSC301.csv".to_string();
    let record = ClosedSession {
        session: closed,
        archive_path: archive_path.clone(),
    };
    h.data
        .create_if_absent(
            &closed_record_path(session.id),
            &serde_json::to_string(&record).unwrap(),
            "close record",
        )
        .await
        .unwrap();

    // The retried close must return the record AND release the slot
    let retried = h.manager.close(&key(), session.id).await.unwrap();
    assert_eq!(retried.archive_path, archive_path);
    assert!(h.manager.fetch(&key()).await.unwrap().is_none());
    h.manager.create(&key(), "CSC302", "rep1").await.unwrap();
}

#[tokio::test]
async fn test_create_rejects_blank_key_components() {
    let h = harness();
    let blank = SessionKey::new("", " ", "300");
    let err = h.manager.create(&blank, "CSC301", "rep1").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidFormat(_)));
    assert!(h.data.is_empty().await);
}

#[tokio::test]
async fn test_close_wrong_session_id_rejected() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();

    let err = h.manager.close(&key(), Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, SessionError::NotActive));

    // The real session is untouched
    assert!(h.manager.fetch(&key()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_entries_rejected_after_close() {
    let h = harness();
    let session = h.manager.create(&key(), "CSC301", "rep1").await.unwrap();
    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "")
        .await
        .unwrap();
    h.manager.close(&key(), session.id).await.unwrap();

    let err = h
        .manager
        .add_entry(&key(), &draft("ADEYEMI", "Funke", "20209999999"), "")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotActive));
}

#[tokio::test]
async fn test_device_bindings_span_the_whole_session() {
    let h = harness();
    h.manager.create(&key(), "CSC301", "rep1").await.unwrap();

    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "dev_a")
        .await
        .unwrap();
    // Rep deletes the entry; the device stays bound
    h.manager.delete_entry(&key(), "20200123456").await.unwrap();

    let err = h
        .manager
        .add_entry(&key(), &draft("ADEYEMI", "Funke", "20209999999"), "dev_a")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AlreadyBound { .. }));

    // The original student can still re-sign from their device
    h.manager
        .add_entry(&key(), &draft("OKAFOR", "John", "20200123456"), "dev_a")
        .await
        .unwrap();
    assert_ne!(h.data.len().await, 0);
}
