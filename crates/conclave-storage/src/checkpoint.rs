//! Workflow checkpoint store: transactional persistence of `WorkflowState`,
//! the ground truth the Workflow Engine resumes from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use conclave_core::{EngineError, EngineResult, WorkflowId, WorkflowState};
use dashmap::DashMap;
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Transactional persistence for [`WorkflowState`]: `save`, `load`,
/// `delete`, and `list_pending` (every checkpoint whose phase is not yet
/// terminal, i.e. resumable on restart).
#[async_trait]
pub trait WorkflowCheckpointStore: Send + Sync {
    /// Persist `state`, replacing any prior checkpoint for the same
    /// `workflow_id`. Must be atomic: a reader never observes a partially
    /// written checkpoint.
    async fn save(&self, state: &WorkflowState) -> EngineResult<()>;

    /// Load the latest checkpoint for `workflow_id`, if any.
    async fn load(&self, workflow_id: WorkflowId) -> EngineResult<Option<WorkflowState>>;

    /// Remove a workflow's checkpoint entirely.
    async fn delete(&self, workflow_id: WorkflowId) -> EngineResult<()>;

    /// List every checkpoint whose phase has not yet reached a terminal
    /// state — the set a restarted engine re-advertises.
    async fn list_pending(&self) -> EngineResult<Vec<WorkflowState>>;
}

/// In-memory [`WorkflowCheckpointStore`], used by tests and the
/// `conclave-test` fixtures. Nothing survives process restart.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    states: DashMap<WorkflowId, WorkflowState>,
}

impl InMemoryCheckpointStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowCheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, state: &WorkflowState) -> EngineResult<()> {
        self.states.insert(state.workflow_id, state.clone());
        Ok(())
    }

    async fn load(&self, workflow_id: WorkflowId) -> EngineResult<Option<WorkflowState>> {
        Ok(self.states.get(&workflow_id).map(|s| s.clone()))
    }

    async fn delete(&self, workflow_id: WorkflowId) -> EngineResult<()> {
        self.states.remove(&workflow_id);
        Ok(())
    }

    async fn list_pending(&self) -> EngineResult<Vec<WorkflowState>> {
        Ok(self.states.iter().filter(|e| !e.value().phase.is_terminal()).map(|e| e.value().clone()).collect())
    }
}

/// File-backed [`WorkflowCheckpointStore`]: one `workflows/{workflow_id}.state.json`
/// per workflow, written with the same write-temp-then-rename atomicity
/// `conclave_workspace::manager` uses for artifacts — a checkpoint is either
/// the prior state or the new one, never a half-written file.
pub struct FileCheckpointStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileCheckpointStore {
    /// Construct a store rooted at `root` (the data root's `workflows/`
    /// dir's parent).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), lock: Mutex::new(()) }
    }

    fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    fn state_path(&self, workflow_id: WorkflowId) -> PathBuf {
        self.workflows_dir().join(format!("{}.state.json", workflow_id.0))
    }
}

fn temp_sibling(target: &Path) -> PathBuf {
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(format!(".tmp-{}", Uuid::new_v4()));
    PathBuf::from(tmp)
}

#[async_trait]
impl WorkflowCheckpointStore for FileCheckpointStore {
    async fn save(&self, state: &WorkflowState) -> EngineResult<()> {
        let _guard = self.lock.lock().await;
        fs::create_dir_all(self.workflows_dir()).await?;
        let path = self.state_path(state.workflow_id);
        let bytes = serde_json::to_vec_pretty(state).map_err(|e| EngineError::Serde(e.to_string()))?;
        let tmp = temp_sibling(&path);
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, workflow_id: WorkflowId) -> EngineResult<Option<WorkflowState>> {
        let _guard = self.lock.lock().await;
        let path = self.state_path(workflow_id);
        match fs::read(&path).await {
            Ok(bytes) => {
                let state = serde_json::from_slice(&bytes).map_err(|e| EngineError::Serde(e.to_string()))?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, workflow_id: WorkflowId) -> EngineResult<()> {
        let _guard = self.lock.lock().await;
        match fs::remove_file(self.state_path(workflow_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_pending(&self) -> EngineResult<Vec<WorkflowState>> {
        let _guard = self.lock.lock().await;
        let mut pending = Vec::new();
        let mut read_dir = match fs::read_dir(self.workflows_dir()).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(pending),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            let state: WorkflowState = serde_json::from_slice(&bytes).map_err(|e| EngineError::Serde(e.to_string()))?;
            if !state.phase.is_terminal() {
                pending.push(state);
            }
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{Request, SessionId};

    fn sample_state(session: &str) -> WorkflowState {
        let session_id = SessionId::from(session);
        WorkflowState::new(WorkflowId::new(), session_id.clone(), Request::new(session_id, "hi"))
    }

    #[tokio::test]
    async fn file_store_round_trips_a_checkpoint() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let state = sample_state("s1");
        store.save(&state).await.unwrap();
        let loaded = store.load(state.workflow_id).await.unwrap().unwrap();
        assert_eq!(loaded.workflow_id, state.workflow_id);
    }

    #[tokio::test]
    async fn list_pending_excludes_terminal_workflows() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        let mut running = sample_state("s1");
        running.phase = running.phase.transition(conclave_core::WorkflowPhase::Planning).unwrap();
        store.save(&running).await.unwrap();

        let mut done = sample_state("s2");
        done.phase = conclave_core::WorkflowPhase::Completed;
        store.save(&done).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].workflow_id, running.workflow_id);
    }

    #[tokio::test]
    async fn delete_removes_the_checkpoint() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let state = sample_state("s1");
        store.save(&state).await.unwrap();
        store.delete(state.workflow_id).await.unwrap();
        assert!(store.load(state.workflow_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryCheckpointStore::new();
        let state = sample_state("s1");
        store.save(&state).await.unwrap();
        assert!(store.load(state.workflow_id).await.unwrap().is_some());
    }
}
