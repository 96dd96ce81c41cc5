use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::models::{SessionListItem, SessionStatus, SessionView};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, BearerIdentity};
use crate::services::{CreateSessionInput, SessionPatch};

/// Body of PUT /api/sessions/:id/status
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub situacao: SessionStatus,
}

fn path_id(path: Result<Path<i32>, PathRejection>) -> Result<i32, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::bad_request(format!("Invalid id: {}", e.body_text())))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::invalid_json(e.body_text()))
}

/// GET /api/sessions - every session of the caller's patients
pub async fn list(
    State(state): State<AppState>,
    identity: BearerIdentity,
) -> ApiResult<Vec<SessionListItem>> {
    Ok(ApiResponse::success(state.ledger.list_sessions(&identity).await))
}

/// POST /api/sessions - book a consultation
pub async fn create(
    State(state): State<AppState>,
    identity: BearerIdentity,
    payload: Result<Json<CreateSessionInput>, JsonRejection>,
) -> ApiResult<SessionView> {
    let input = body(payload)?;
    let created = state.ledger.create_session(&identity, input).await?;
    Ok(ApiResponse::created(created))
}

/// PATCH /api/sessions/:id - partial update
pub async fn update(
    State(state): State<AppState>,
    identity: BearerIdentity,
    path: Result<Path<i32>, PathRejection>,
    payload: Result<Json<SessionPatch>, JsonRejection>,
) -> ApiResult<SessionView> {
    let id = path_id(path)?;
    let patch = body(payload)?;
    let updated = state.ledger.update_session(&identity, id, patch).await?;
    Ok(ApiResponse::success(updated))
}

/// DELETE /api/sessions/:id
pub async fn delete(
    State(state): State<AppState>,
    identity: BearerIdentity,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<Value> {
    let id = path_id(path)?;
    state.ledger.delete_session(&identity, id).await?;
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

/// PUT /api/sessions/:id/status - mark paid or open
pub async fn update_status(
    State(state): State<AppState>,
    identity: BearerIdentity,
    path: Result<Path<i32>, PathRejection>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Value> {
    let id = path_id(path)?;
    let StatusUpdate { situacao } = body(payload)?;
    state.ledger.update_session_status(&identity, id, situacao).await?;
    Ok(ApiResponse::success(json!({ "id": id, "situacao": situacao })))
}

/// GET /api/patients/:id/sessions
pub async fn list_for_patient(
    State(state): State<AppState>,
    identity: BearerIdentity,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<Vec<SessionView>> {
    let patient_id = path_id(path)?;
    let sessions = state.ledger.list_sessions_for_patient(&identity, patient_id).await;
    Ok(ApiResponse::success(sessions))
}

/// GET /api/patients/:id/sessions/open - unpaid sessions, oldest first
pub async fn list_open_for_patient(
    State(state): State<AppState>,
    identity: BearerIdentity,
    path: Result<Path<i32>, PathRejection>,
) -> ApiResult<Vec<SessionView>> {
    let patient_id = path_id(path)?;
    let sessions = state
        .ledger
        .list_open_sessions_for_patient(&identity, patient_id)
        .await;
    Ok(ApiResponse::success(sessions))
}
