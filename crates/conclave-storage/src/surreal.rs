//! Embedded-`SurrealDB` checkpoint tier (feature `surreal`).
//!
//! Uses a `SurrealKV`-backed embedded connection (`surrealkv://` for durable
//! storage, `mem://` for tests), narrowed here to one record kind
//! (`WorkflowState`) instead of a general query surface, since the engine
//! only ever needs key-addressed save/load.

use async_trait::async_trait;
use conclave_core::{EngineError, EngineResult, WorkflowId, WorkflowState};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;

use crate::checkpoint::WorkflowCheckpointStore;

const TABLE: &str = "workflow_checkpoint";

#[derive(Serialize, Deserialize)]
struct CheckpointRow {
    id: String,
    state: WorkflowState,
}

/// [`WorkflowCheckpointStore`] backed by an embedded `SurrealDB` instance
/// using the `SurrealKV` storage engine.
pub struct SurrealCheckpointStore {
    db: Surreal<Any>,
}

impl SurrealCheckpointStore {
    /// Connect to a `SurrealKV`-backed database persisted at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if the connection or namespace/database
    /// selection fails.
    pub async fn connect_embedded(path: &str) -> EngineResult<Self> {
        let db: Surreal<Any> = Surreal::init();
        db.connect(format!("surrealkv://{path}"))
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;
        db.use_ns("conclave")
            .use_db("checkpoints")
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;
        Ok(Self { db })
    }

    /// Connect to an in-memory instance, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if the connection fails.
    pub async fn connect_memory() -> EngineResult<Self> {
        let db: Surreal<Any> = Surreal::init();
        db.connect("mem://").await.map_err(|e| EngineError::Io(e.to_string()))?;
        db.use_ns("conclave")
            .use_db("checkpoints")
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl WorkflowCheckpointStore for SurrealCheckpointStore {
    async fn save(&self, state: &WorkflowState) -> EngineResult<()> {
        let id = state.workflow_id.0.to_string();
        let row = CheckpointRow { id: id.clone(), state: state.clone() };
        let _: Option<CheckpointRow> = self
            .db
            .upsert((TABLE, id))
            .content(row)
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, workflow_id: WorkflowId) -> EngineResult<Option<WorkflowState>> {
        let id = workflow_id.0.to_string();
        let row: Option<CheckpointRow> = self
            .db
            .select((TABLE, id))
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;
        Ok(row.map(|r| r.state))
    }

    async fn delete(&self, workflow_id: WorkflowId) -> EngineResult<()> {
        let id = workflow_id.0.to_string();
        let _: Option<CheckpointRow> = self
            .db
            .delete((TABLE, id))
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;
        Ok(())
    }

    async fn list_pending(&self) -> EngineResult<Vec<WorkflowState>> {
        let rows: Vec<CheckpointRow> = self.db.select(TABLE).await.map_err(|e| EngineError::Io(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.state).filter(|s| !s.phase.is_terminal()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{Request, SessionId};

    #[tokio::test]
    async fn round_trips_a_checkpoint_in_memory() {
        let store = SurrealCheckpointStore::connect_memory().await.unwrap();
        let session_id = SessionId::from("s1");
        let state = WorkflowState::new(WorkflowId::new(), session_id.clone(), Request::new(session_id, "hi"));
        store.save(&state).await.unwrap();
        let loaded = store.load(state.workflow_id).await.unwrap().unwrap();
        assert_eq!(loaded.workflow_id, state.workflow_id);
    }
}
