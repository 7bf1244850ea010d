//! `/tools/execute` — invokes the Tool Layer (C1) directly, outside a
//! running workflow, against the caller's session workspace.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use conclave_core::SessionId;
use conclave_tools::{ToolContext, ToolExecutor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::state::AppState;

/// Body for `POST /tools/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    pub tool_name: String,
    #[serde(default)]
    pub params: Value,
    pub session_id: String,
}

/// JSON shape of a tool invocation's result.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// `POST /tools/execute` — the session must already have a bound workspace
/// (via a prior workflow run or `/workspace/set`); there is no implicit
/// slug-derived workspace creation on this path.
pub async fn execute(
    State(state): State<AppState>,
    Json(body): Json<ExecuteBody>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let session_id = SessionId::from(body.session_id);
    let workspace_root = state.services.workspace.binding(&session_id).ok_or_else(|| {
        ApiError::bad_request(format!("session {session_id} has no bound workspace; call /workspace/set first"))
    })?;

    let ctx = ToolContext::new(workspace_root);
    let executor = ToolExecutor::new(&state.services.tools);
    let deadline = Duration::from_secs(state.services.config.engine.default_stage_timeout_secs);
    let cancel = CancellationToken::new();

    let result = executor.invoke(&body.tool_name, body.params, &ctx, deadline, &cancel).await;
    Ok(Json(ExecuteResponse {
        success: result.success,
        output: result.output,
        error: result.error,
        elapsed_ms: result.metrics.elapsed_ms,
    }))
}
