//! Conversation store: durable, append-only per-session messages, artifact
//! metadata, and per-workflow summaries.
//!
//! Keeps a serializable mirror of live session state, and reuses
//! `conclave_workspace::manager`'s write-temp-then-rename idiom for the
//! file-backed tier's atomicity.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use conclave_core::{EngineError, EngineResult, SessionId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One message appended to a session's conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// `"user"`, `"assistant"`, or `"system"`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// When the message was appended.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Metadata for one artifact durably recorded against a session. The
/// content itself lives content-addressed under `artifacts/{digest}`; this
/// record is the manifest entry pointing at it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Path relative to the session workspace.
    pub relative_path: String,
    /// `created` | `modified` | `deleted`.
    pub action: String,
    /// Hex-encoded SHA-256 digest of the content blob.
    pub digest: String,
    /// Size of the content blob in bytes.
    pub size_bytes: u64,
    /// Owning workflow.
    pub workflow_id: String,
    /// When the artifact was recorded.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// One-line summary of a completed or failed workflow, appended once it
/// reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// The summarized workflow.
    pub workflow_id: String,
    /// Terminal phase reached (`completed`, `failed`, `cancelled`).
    pub outcome: String,
    /// Free-text summary, typically the Aggregator's output.
    pub text: String,
    /// When the workflow reached its terminal state.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// The full durable record for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Append-only message log.
    pub messages: Vec<ConversationMessage>,
    /// Append-only artifact manifest.
    pub artifacts: Vec<ArtifactRecord>,
    /// Append-only workflow summaries.
    pub workflow_summaries: Vec<WorkflowSummary>,
}

/// Durable, append-only per-session store: messages, artifact metadata, and
/// workflow summaries.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// List every session id with a recorded conversation.
    async fn list(&self) -> EngineResult<Vec<SessionId>>;

    /// Fetch a session's full conversation record, if any.
    async fn get(&self, session_id: &SessionId) -> EngineResult<Option<ConversationRecord>>;

    /// Append one message to a session's log, creating the record if absent.
    async fn append_message(&self, session_id: &SessionId, message: ConversationMessage) -> EngineResult<()>;

    /// Append one artifact's content, content-addressed by its digest, and
    /// record its manifest entry.
    async fn append_artifact(
        &self,
        session_id: &SessionId,
        record: ArtifactRecord,
        content: &[u8],
    ) -> EngineResult<()>;

    /// Append one workflow summary.
    async fn append_summary(&self, session_id: &SessionId, summary: WorkflowSummary) -> EngineResult<()>;

    /// Remove a session's entire conversation record.
    async fn delete(&self, session_id: &SessionId) -> EngineResult<()>;
}

/// Compute the hex SHA-256 digest of `content`, as recorded in
/// [`ArtifactRecord::digest`].
#[must_use]
pub fn digest_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// In-memory [`ConversationStore`], used by tests and by
/// `conclave-test` fixtures. Nothing survives process restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    records: DashMap<SessionId, ConversationRecord>,
}

impl InMemoryConversationStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn list(&self) -> EngineResult<Vec<SessionId>> {
        Ok(self.records.iter().map(|e| e.key().clone()).collect())
    }

    async fn get(&self, session_id: &SessionId) -> EngineResult<Option<ConversationRecord>> {
        Ok(self.records.get(session_id).map(|r| r.clone()))
    }

    async fn append_message(&self, session_id: &SessionId, message: ConversationMessage) -> EngineResult<()> {
        self.records.entry(session_id.clone()).or_default().messages.push(message);
        Ok(())
    }

    async fn append_artifact(
        &self,
        session_id: &SessionId,
        record: ArtifactRecord,
        _content: &[u8],
    ) -> EngineResult<()> {
        self.records.entry(session_id.clone()).or_default().artifacts.push(record);
        Ok(())
    }

    async fn append_summary(&self, session_id: &SessionId, summary: WorkflowSummary) -> EngineResult<()> {
        self.records.entry(session_id.clone()).or_default().workflow_summaries.push(summary);
        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> EngineResult<()> {
        self.records.remove(session_id);
        Ok(())
    }
}

/// File-backed [`ConversationStore`]: `sessions/{session_id}/conversation.json`
/// plus content-addressed blobs under `sessions/{session_id}/artifacts/{digest}`.
///
/// Appends are read-modify-write under a per-store mutex — the append rate
/// for a single session's conversation log is low enough (human-paced chat
/// turns, one artifact batch per stage) that a coarse lock never becomes a
/// bottleneck, unlike the per-workflow checkpoint path which writes
/// far more often.
pub struct FileConversationStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileConversationStore {
    /// Construct a store rooted at `root` (the data root's `sessions/` dir's
    /// parent; `root` itself should contain a `sessions` subdirectory).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), lock: Mutex::new(()) }
    }

    fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.root.join("sessions").join(session_id.to_string())
    }

    fn conversation_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("conversation.json")
    }

    fn artifacts_dir(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("artifacts")
    }

    async fn read_record(&self, session_id: &SessionId) -> EngineResult<ConversationRecord> {
        let path = self.conversation_path(session_id);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| EngineError::Serde(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConversationRecord::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, session_id: &SessionId, record: &ConversationRecord) -> EngineResult<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).await?;
        let path = self.conversation_path(session_id);
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| EngineError::Serde(e.to_string()))?;
        let tmp = temp_sibling(&path);
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

fn temp_sibling(target: &Path) -> PathBuf {
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(format!(".tmp-{}", Uuid::new_v4()));
    PathBuf::from(tmp)
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn list(&self) -> EngineResult<Vec<SessionId>> {
        let sessions_dir = self.root.join("sessions");
        let mut ids = Vec::new();
        let mut read_dir = match fs::read_dir(&sessions_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = read_dir.next_entry().await? {
            if entry.file_type().await.is_ok_and(|ft| ft.is_dir()) {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(SessionId::from(name.to_owned()));
                }
            }
        }
        Ok(ids)
    }

    async fn get(&self, session_id: &SessionId) -> EngineResult<Option<ConversationRecord>> {
        let _guard = self.lock.lock().await;
        if !self.conversation_path(session_id).exists() {
            return Ok(None);
        }
        Ok(Some(self.read_record(session_id).await?))
    }

    async fn append_message(&self, session_id: &SessionId, message: ConversationMessage) -> EngineResult<()> {
        let _guard = self.lock.lock().await;
        let mut record = self.read_record(session_id).await?;
        record.messages.push(message);
        self.write_record(session_id, &record).await
    }

    async fn append_artifact(
        &self,
        session_id: &SessionId,
        record: ArtifactRecord,
        content: &[u8],
    ) -> EngineResult<()> {
        let _guard = self.lock.lock().await;
        let blobs_dir = self.artifacts_dir(session_id);
        fs::create_dir_all(&blobs_dir).await?;
        let blob_path = blobs_dir.join(&record.digest);
        if fs::metadata(&blob_path).await.is_err() {
            let tmp = temp_sibling(&blob_path);
            fs::write(&tmp, content).await?;
            fs::rename(&tmp, &blob_path).await?;
        }

        let mut conversation = self.read_record(session_id).await?;
        conversation.artifacts.push(record);
        self.write_record(session_id, &conversation).await
    }

    async fn append_summary(&self, session_id: &SessionId, summary: WorkflowSummary) -> EngineResult<()> {
        let _guard = self.lock.lock().await;
        let mut record = self.read_record(session_id).await?;
        record.workflow_summaries.push(summary);
        self.write_record(session_id, &record).await
    }

    async fn delete(&self, session_id: &SessionId) -> EngineResult<()> {
        let _guard = self.lock.lock().await;
        let dir = self.session_dir(session_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Summary row returned by `GET /sessions` — enough to render a session
/// list without loading each full conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: SessionId,
    /// Number of messages recorded.
    pub message_count: usize,
    /// Number of artifacts recorded.
    pub artifact_count: usize,
}

/// Build [`SessionSummary`] rows for every session a store knows about.
///
/// # Errors
///
/// Propagates any [`EngineError`] from listing or reading a session record.
pub async fn list_summaries(store: &dyn ConversationStore) -> EngineResult<Vec<SessionSummary>> {
    let mut out = Vec::new();
    for session_id in store.list().await? {
        if let Some(record) = store.get(&session_id).await? {
            out.push(SessionSummary {
                session_id,
                message_count: record.messages.len(),
                artifact_count: record.artifacts.len(),
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trips_a_message() {
        let store = InMemoryConversationStore::new();
        let session = SessionId::from("s1");
        store
            .append_message(&session, ConversationMessage { role: "user".into(), content: "hi".into(), timestamp: chrono_epoch() })
            .await
            .unwrap();
        let record = store.get(&session).await.unwrap().unwrap();
        assert_eq!(record.messages.len(), 1);
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::TempDir::new().unwrap();
        let session = SessionId::from("s1");
        {
            let store = FileConversationStore::new(dir.path());
            store
                .append_message(&session, ConversationMessage { role: "user".into(), content: "hi".into(), timestamp: chrono_epoch() })
                .await
                .unwrap();
        }
        let store = FileConversationStore::new(dir.path());
        let record = store.get(&session).await.unwrap().unwrap();
        assert_eq!(record.messages.len(), 1);
    }

    #[tokio::test]
    async fn file_store_content_addresses_artifacts() {
        let dir = tempfile::TempDir::new().unwrap();
        let session = SessionId::from("s1");
        let store = FileConversationStore::new(dir.path());
        let content = b"fn main() {}";
        let digest = digest_hex(content);
        store
            .append_artifact(
                &session,
                ArtifactRecord {
                    relative_path: "src/main.rs".into(),
                    action: "created".into(),
                    digest: digest.clone(),
                    size_bytes: content.len() as u64,
                    workflow_id: "wf1".into(),
                    timestamp: chrono_epoch(),
                },
                content,
            )
            .await
            .unwrap();
        let blob_path = dir.path().join("sessions").join("s1").join("artifacts").join(&digest);
        assert!(blob_path.exists());
    }

    #[tokio::test]
    async fn delete_removes_the_session_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let session = SessionId::from("s1");
        let store = FileConversationStore::new(dir.path());
        store
            .append_message(&session, ConversationMessage { role: "user".into(), content: "hi".into(), timestamp: chrono_epoch() })
            .await
            .unwrap();
        store.delete(&session).await.unwrap();
        assert!(store.get(&session).await.unwrap().is_none());
    }

    fn chrono_epoch() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(0, 0).unwrap()
    }
}
