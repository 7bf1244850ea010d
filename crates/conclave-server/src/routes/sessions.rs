//! `/sessions/*` — thin projections over the Conversation Store (C9).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use conclave_core::SessionId;
use conclave_storage::{list_summaries, ConversationRecord, SessionSummary};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /sessions` — one summary row per known session.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let summaries = list_summaries(state.services.conversations.as_ref())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(summaries))
}

/// `GET /sessions/{id}` — the full conversation record.
pub async fn get(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ConversationRecord>, ApiError> {
    let session_id = SessionId::from(session_id);
    let record = state.services.conversations.get(&session_id).await?;
    record
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no conversation recorded for session {session_id}")))
}

/// `DELETE /sessions/{id}`.
pub async fn remove(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session_id = SessionId::from(session_id);
    state.services.conversations.delete(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
