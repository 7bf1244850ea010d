//! `/hitl/*`: pending-request listing, responses, and a WebSocket push of
//! lifecycle events, grounded in `serve::app`'s
//! `WebSocketUpgrade` + `on_upgrade` shape.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use conclave_core::{HitlRequest, HitlResponse, RequestId, WorkflowId};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Query params for `GET /hitl/pending`.
#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub workflow_id: Option<Uuid>,
}

/// `GET /hitl/pending?workflow_id=` — requests still awaiting a human.
pub async fn pending(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Json<Vec<HitlRequest>> {
    Json(state.engine.list_pending_hitl(query.workflow_id.map(WorkflowId)))
}

/// `POST /hitl/respond/{request_id}` — the path id always wins over a
/// mismatched id in the body.
pub async fn respond(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(mut body): Json<HitlResponse>,
) -> Result<(), ApiError> {
    body.request_id = RequestId(request_id);
    state.engine.resolve_hitl(RequestId(request_id), body)?;
    Ok(())
}

/// `GET /hitl/ws` — every workflow's HITL lifecycle, polled and diffed since
/// the Event Bus only supports per-workflow subscription.
pub async fn ws_broadcast(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| push_pending_snapshots(socket, state, None))
}

/// `GET /hitl/ws/{workflow_id}` — one workflow's HITL lifecycle, pushed in
/// real time by subscribing to its Event Bus channel and filtering for
/// `hitl_*` kinds.
pub async fn ws_scoped(
    ws: WebSocketUpgrade,
    Path(workflow_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| push_workflow_events(socket, state, WorkflowId(workflow_id)))
}

async fn push_workflow_events(mut socket: WebSocket, state: AppState, workflow_id: WorkflowId) {
    let mut receiver = state.engine.subscribe(workflow_id);
    loop {
        tokio::select! {
            biased;
            frame = socket.recv() => {
                if frame.is_none() {
                    break;
                }
            }
            event = receiver.recv() => {
                let Some(event) = event else { break };
                if !is_hitl_event(event.event_type()) {
                    continue;
                }
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// No cross-workflow broadcast exists for HITL lifecycle events, so the
/// unscoped socket re-polls [`conclave_engine::Engine::list_pending_hitl`]
/// and pushes a fresh snapshot whenever the pending set changes.
async fn push_pending_snapshots(mut socket: WebSocket, state: AppState, workflow_id: Option<WorkflowId>) {
    let mut last_payload = String::new();
    let mut interval = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            biased;
            frame = socket.recv() => {
                if frame.is_none() {
                    break;
                }
            }
            _ = interval.tick() => {
                let snapshot = state.engine.list_pending_hitl(workflow_id);
                let Ok(payload) = serde_json::to_string(&snapshot) else { continue };
                if payload == last_payload {
                    continue;
                }
                if socket.send(Message::Text(payload.clone())).await.is_err() {
                    break;
                }
                last_payload = payload;
            }
        }
    }
}

fn is_hitl_event(event_type: &str) -> bool {
    event_type.starts_with("hitl_")
}
