//! Attendance service routes
//!
//! The HTTP layer is stateless: every handler reads whatever it needs from
//! the remote store through the session manager, so any number of instances
//! (or browser tabs) can reconnect at any time. Flows mirror the product:
//! students poll for a running session, verify the rotating code and sign;
//! reps start, correct and close sessions; advisors tune the rotation
//! period.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::AppState;
use crate::error::SessionError;
use crate::models::{Entry, EntryDraft, Session, SessionKey, SessionStatus};
use crate::settings::Settings;
use crate::token;

/// Create the router for the attendance service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/active", get(active_session))
        .route("/sessions/code", get(session_code))
        .route("/sessions/sign", post(sign))
        .route("/sessions/entries", post(add_entry).put(edit_entry).delete(delete_entry))
        .route("/sessions/close", post(close_session))
        .route("/settings", get(get_settings).put(update_settings))
        .with_state(state)
}

/// Session key supplied as query parameters
#[derive(Deserialize)]
pub struct KeyQuery {
    pub school: String,
    pub department: String,
    pub level: String,
}

impl KeyQuery {
    fn key(&self) -> SessionKey {
        SessionKey::new(
            self.school.clone(),
            self.department.clone(),
            self.level.clone(),
        )
    }
}

/// Session view returned to reps — never carries the seed
#[derive(Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub school: String,
    pub department: String,
    pub level: String,
    pub course_code: String,
    pub rep_username: String,
    pub rotation_period: u64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub entries: Vec<Entry>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            school: session.school,
            department: session.department,
            level: session.level,
            course_code: session.course_code,
            rep_username: session.rep_username,
            rotation_period: session.rotation_period,
            status: session.status,
            created_at: session.created_at,
            closed_at: session.closed_at,
            entries: session.entries,
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "attendance-service"
    }))
}

/// Request to start a new attendance session
#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub school: String,
    pub department: String,
    pub level: String,
    pub course_code: String,
    pub rep_username: String,
}

/// Rep starts an attendance session
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!(
        "Session create request: {} by {}",
        payload.course_code, payload.rep_username
    );

    let key = SessionKey::new(payload.school, payload.department, payload.level);
    let session = state
        .manager
        .create(&key, &payload.course_code, &payload.rep_username)
        .await?;

    Ok((StatusCode::CREATED, Json(SessionView::from(session))))
}

/// Student poll: is attendance running for my class?
pub async fn active_session(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.manager.fetch(&query.key()).await?;

    let body = match session.filter(Session::is_active) {
        Some(session) => json!({
            "running": true,
            "course_code": session.course_code,
            "department": session.department,
            "level": session.level,
        }),
        None => json!({ "running": false }),
    };
    Ok(Json(body))
}

/// Rep display: the current code and how long it remains valid
pub async fn session_code(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .manager
        .fetch(&query.key())
        .await?
        .filter(Session::is_active)
        .ok_or(ApiError::from(SessionError::NotActive))?;

    let now = Utc::now();
    Ok(Json(json!({
        "session_id": session.id,
        "course_code": session.course_code,
        "code": token::current_code(&session, now),
        "seconds_remaining": token::seconds_remaining(&session, now),
        "rotation_period": session.rotation_period,
        "entry_count": session.entries.len(),
    })))
}

/// Student sign-in request
#[derive(Deserialize)]
pub struct SignRequest {
    pub school: String,
    pub department: String,
    pub level: String,
    pub code: String,
    pub surname: String,
    pub other_names: String,
    pub matric: String,
    /// Opaque per-browser device identifier; may be empty
    #[serde(default)]
    pub device_id: String,
}

/// Student verifies the rotating code and signs attendance
pub async fn sign(
    State(state): State<AppState>,
    Json(payload): Json<SignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = SessionKey::new(payload.school, payload.department, payload.level);
    let draft = EntryDraft {
        surname: payload.surname,
        other_names: payload.other_names,
        matric: payload.matric,
    };

    let entry = state
        .manager
        .sign_in(&key, &payload.code, &draft, &payload.device_id)
        .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

/// Rep manual-entry request (no code or device check)
#[derive(Deserialize)]
pub struct EntryRequest {
    pub school: String,
    pub department: String,
    pub level: String,
    pub surname: String,
    pub other_names: String,
    pub matric: String,
}

/// Rep adds an entry by hand
pub async fn add_entry(
    State(state): State<AppState>,
    Json(payload): Json<EntryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = SessionKey::new(payload.school, payload.department, payload.level);
    let draft = EntryDraft {
        surname: payload.surname,
        other_names: payload.other_names,
        matric: payload.matric,
    };

    let entry = state.manager.add_entry(&key, &draft, "").await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Rep edit request: `matric` selects the entry, the rest replaces it
#[derive(Deserialize)]
pub struct EditEntryRequest {
    pub school: String,
    pub department: String,
    pub level: String,
    pub matric: String,
    pub surname: String,
    pub other_names: String,
    pub new_matric: String,
}

/// Rep corrects an entry
pub async fn edit_entry(
    State(state): State<AppState>,
    Json(payload): Json<EditEntryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = SessionKey::new(payload.school, payload.department, payload.level);
    let draft = EntryDraft {
        surname: payload.surname,
        other_names: payload.other_names,
        matric: payload.new_matric,
    };

    let entry = state
        .manager
        .edit_entry(&key, &payload.matric, &draft)
        .await?;
    Ok(Json(entry))
}

/// Rep delete request
#[derive(Deserialize)]
pub struct DeleteEntryRequest {
    pub school: String,
    pub department: String,
    pub level: String,
    pub matric: String,
}

/// Rep removes an entry
pub async fn delete_entry(
    State(state): State<AppState>,
    Json(payload): Json<DeleteEntryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = SessionKey::new(payload.school, payload.department, payload.level);
    state.manager.delete_entry(&key, &payload.matric).await?;
    Ok(Json(json!({ "message": "Entry removed" })))
}

/// Close request: the id pins the close to one specific session
#[derive(Deserialize)]
pub struct CloseSessionRequest {
    pub school: String,
    pub department: String,
    pub level: String,
    pub session_id: Uuid,
}

/// Rep ends the session; entries are archived as CSV
pub async fn close_session(
    State(state): State<AppState>,
    Json(payload): Json<CloseSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = SessionKey::new(payload.school, payload.department, payload.level);
    let record = state.manager.close(&key, payload.session_id).await?;

    Ok(Json(json!({
        "session": SessionView::from(record.session),
        "archive_path": record.archive_path,
    })))
}

/// Advisor reads the current settings
pub async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let settings = Settings::load(&*state.store).await.map_err(|e| {
        error!("Failed to load settings: {}", e);
        ApiError::Internal
    })?;
    Ok(Json(settings))
}

/// Advisor updates the rotation period (affects new sessions only)
pub async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> Result<impl IntoResponse, ApiError> {
    settings.save(&*state.store).await?;
    Ok(Json(settings))
}

/// Custom error type for the attendance routes
#[derive(Debug)]
pub enum ApiError {
    Session(SessionError),
    Internal,
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Session(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Session(err) => {
                let status = match &err {
                    SessionError::Conflict(_) | SessionError::DuplicateMatric { .. } => {
                        StatusCode::CONFLICT
                    }
                    SessionError::AlreadyBound { .. } => StatusCode::FORBIDDEN,
                    SessionError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
                    SessionError::InvalidCode => StatusCode::UNAUTHORIZED,
                    SessionError::NotActive | SessionError::EntryNotFound => StatusCode::NOT_FOUND,
                    SessionError::Busy => StatusCode::SERVICE_UNAVAILABLE,
                    SessionError::ArchiveWriteFailed(_) => StatusCode::BAD_GATEWAY,
                    SessionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!("Store failure: {}", err);
                    (status, "Internal server error".to_string())
                } else {
                    (status, err.to_string())
                }
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
