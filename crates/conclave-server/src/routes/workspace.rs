//! `/workspace/*` — direct workspace file access (C2) outside a running
//! workflow: listing, reading, writing, and (re)binding a session's
//! workspace directory.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use conclave_core::SessionId;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

fn bound_root(state: &AppState, session_id: &SessionId) -> Result<std::path::PathBuf, ApiError> {
    state.services.workspace.binding(session_id).ok_or_else(|| {
        ApiError::bad_request(format!("session {session_id} has no bound workspace; call /workspace/set first"))
    })
}

/// Query params for `GET /workspace/files`.
#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    pub session_id: String,
    #[serde(default)]
    pub workspace_path: String,
    #[serde(default = "default_depth")]
    pub depth: usize,
}

fn default_depth() -> usize {
    1
}

/// `GET /workspace/files?workspace_path=`.
pub async fn files(
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let session_id = SessionId::from(query.session_id);
    let root = bound_root(&state, &session_id)?;
    let entries = state.services.workspace.list_files(&root, &query.workspace_path, query.depth).await?;
    Ok(Json(entries))
}

/// Query params for `GET /workspace/read`.
#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub session_id: String,
    pub workspace_path: String,
}

/// `GET /workspace/read`.
pub async fn read(
    State(state): State<AppState>,
    Query(query): Query<ReadQuery>,
) -> Result<String, ApiError> {
    let session_id = SessionId::from(query.session_id);
    let root = bound_root(&state, &session_id)?;
    let content = state.services.workspace.read_file(&root, &query.workspace_path).await?;
    Ok(content)
}

/// Body for `POST /workspace/write`.
#[derive(Debug, Deserialize)]
pub struct WriteBody {
    pub session_id: String,
    pub workspace_path: String,
    pub content: String,
}

/// `POST /workspace/write` — writes through [`conclave_workspace::WorkspaceManager::apply_artifact`]
/// as a `modified`-or-`created` artifact, not tied to any workflow.
pub async fn write(
    State(state): State<AppState>,
    Json(body): Json<WriteBody>,
) -> Result<StatusCode, ApiError> {
    let session_id = SessionId::from(body.session_id);
    let root = bound_root(&state, &session_id)?;
    let artifact = conclave_core::Artifact {
        relative_path: body.workspace_path,
        language: None,
        content: body.content,
        action: conclave_core::ArtifactAction::Modified,
        saved_path: None,
    };
    state.services.workspace.apply_artifact(&root, artifact).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Body for `POST /workspace/set`.
#[derive(Debug, Deserialize)]
pub struct SetBody {
    pub session_id: String,
    pub path: String,
}

/// Response for `POST /workspace/set`.
#[derive(Debug, Serialize)]
pub struct SetResponse {
    pub bound_path: String,
}

/// `POST /workspace/set` — explicitly (re)bind a session to an existing
/// directory, overriding any slug-derived binding.
pub async fn set(
    State(state): State<AppState>,
    Json(body): Json<SetBody>,
) -> Result<Json<SetResponse>, ApiError> {
    let session_id = SessionId::from(body.session_id);
    let bound = state.services.workspace.set_binding(&session_id, body.path).await?;
    Ok(Json(SetResponse { bound_path: bound.display().to_string() }))
}
