//! `/workflow/*`: submission, pause/resume/cancel control, and status.
//!
//! `execute` subscribes to the Event Bus for the new workflow's id *before*
//! calling `submit`, so the `queued{position}` event published
//! synchronously inside `submit` is never missed.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use conclave_core::{Request, SessionId, WorkflowId};
use conclave_events::EventReceiver;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Body for `POST /workflow/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    /// The owning session.
    pub session_id: String,
    /// The user's message, starting a new workflow.
    pub message: String,
    /// Per-request flags, merged into `Request::flags`.
    #[serde(default)]
    pub flags: HashMap<String, Value>,
}

/// `POST /workflow/execute` — streams the new workflow's events as SSE
/// (default) or newline-delimited JSON when `Accept: application/x-ndjson`.
pub async fn execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ExecuteBody>,
) -> Response {
    let mut request = Request::new(SessionId::from(body.session_id), body.message);
    request.flags.extra = body.flags;
    let workflow_id = request.workflow_id;

    let receiver = state.engine.subscribe(workflow_id);
    let _handle = state.engine.submit(request);

    if wants_ndjson(&headers) {
        ndjson_response(receiver)
    } else {
        sse_response(receiver).into_response()
    }
}

fn wants_ndjson(headers: &HeaderMap) -> bool {
    headers
    .get(header::ACCEPT)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v.contains("ndjson"))
}

fn sse_response(
    mut receiver: EventReceiver,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = async_stream::stream! {
        while let Some(event) = receiver.recv().await {
            let event_type = event.event_type();
            if let Ok(payload) = serde_json::to_string(&event) {
                yield Ok(SseEvent::default().event(event_type).data(payload));
            }
        }
    };
    Sse::new(stream)
}

fn ndjson_response(mut receiver: EventReceiver) -> Response {
    let stream = async_stream::stream! {
        while let Some(event) = receiver.recv().await {
            if let Ok(mut line) = serde_json::to_string(&event) {
                line.push('\n');
                yield Ok::<_, Infallible>(axum::body::Bytes::from(line));
            }
        }
    };
    Response::builder()
    .status(StatusCode::OK)
    .header(header::CONTENT_TYPE, "application/x-ndjson")
    .body(Body::from_stream(stream))
    .expect("status and header are statically valid")
}

/// `POST /workflow/pause/{workflow_id}` — `400` if the pause button feature
/// flag is off.
pub async fn pause(State(state): State<AppState>, Path(workflow_id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    if !state.services.config.hitl.enable_pause_button {
        return Err(ApiError::bad_request("the pause-button feature flag is disabled"));
    }
    state.engine.pause(WorkflowId(workflow_id))?;
    Ok(StatusCode::ACCEPTED)
}

/// Body for `POST /workflow/resume/{workflow_id}`.
#[derive(Debug, Default, Deserialize)]
pub struct ResumeBody {
    /// Feedback resubmitted alongside the resume, written into the
    /// workflow's shared context under `user_feedback`.
    #[serde(default)]
    pub message: Option<String>,
}

/// `POST /workflow/resume/{workflow_id}` — resumes from the last checkpoint.
pub async fn resume(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
    body: Option<Json<ResumeBody>>,
) -> Result<StatusCode, ApiError> {
    let feedback = body.and_then(|Json(b)| b.message);
    state.engine.resume(WorkflowId(workflow_id), feedback).await?;
    Ok(StatusCode::ACCEPTED)
}

/// `GET /workflow/status/{workflow_id}` — the latest checkpointed
/// `WorkflowState` projection.
pub async fn status(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<conclave_engine::WorkflowSnapshot>, ApiError> {
    let snapshot = state.engine.status(WorkflowId(workflow_id)).await?;
    snapshot
    .map(Json)
    .ok_or_else(|| ApiError::not_found(format!("no checkpoint for workflow {workflow_id}")))
}

