//! The per-workflow shared-context blackboard.

use conclave_core::{AccessLogEntry, ContextAccess, ContextEntry, EngineError, EngineResult, WorkflowId};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;

struct Inner {
    entries: HashMap<String, ContextEntry>,
    access_log: Vec<AccessLogEntry>,
    total_bytes: usize,
}

/// An append-only, size-capped blackboard that agent stages read from and
/// write to during a single workflow's execution.
///
/// Holds its state behind a `tokio::sync::RwLock` taken only for the
/// duration of each operation: an async `RwLock` rather than a plain mutex,
/// since readers vastly outnumber writers in a fan-out DAG.
pub struct SharedContext {
    workflow_id: WorkflowId,
    max_entries: usize,
    max_bytes: usize,
    inner: RwLock<Inner>,
}

impl SharedContext {
    /// Construct an empty context for `workflow_id` with the given caps.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, max_entries: usize, max_bytes: usize) -> Self {
        Self {
            workflow_id,
            max_entries,
            max_bytes,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                access_log: Vec::new(),
                total_bytes: 0,
            }),
        }
    }

    /// Write a value into the blackboard, overwriting any prior value at the
    /// same key. Rejects the write if it would exceed the entry-count or
    /// byte-size caps.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ContextFull`] if the caps would be exceeded.
    pub async fn put(&self, key: impl Into<String>, entry: ContextEntry) -> EngineResult<()> {
        let key = key.into();
        let size = estimate_size(&key, &entry);
        let mut guard = self.inner.write().await;

        let previous_size = guard
            .entries
            .get(&key)
            .map(|e| estimate_size(&key, e))
            .unwrap_or(0);
        let projected_bytes = guard.total_bytes.saturating_sub(previous_size).saturating_add(size);
        let projected_entries = if guard.entries.contains_key(&key) {
            guard.entries.len()
        } else {
            guard.entries.len().saturating_add(1)
        };

        if projected_entries > self.max_entries || projected_bytes > self.max_bytes {
            warn!(workflow_id = %self.workflow_id, %key, "shared context write rejected, caps exceeded");
            return Err(EngineError::ContextFull(self.workflow_id));
        }

        guard.total_bytes = projected_bytes;
        let writer = entry.agent_id.clone();
        guard.entries.insert(key.clone(), entry);
        guard.access_log.push(AccessLogEntry {
            action: ContextAccess::Put,
            key,
            agents: vec![writer],
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Record that a write lost a same-key race within a parallel group and
    /// was not applied. The existing value is left untouched; only the
    /// access log records the shadowed attempt.
    pub async fn record_shadowed(&self, key: impl Into<String>, agent_id: impl Into<String>) {
        let mut guard = self.inner.write().await;
        guard.access_log.push(AccessLogEntry {
            action: ContextAccess::Shadowed,
            key: key.into(),
            agents: vec![agent_id.into()],
            timestamp: chrono::Utc::now(),
        });
    }

    /// Read a value, logging the access against `reader_agent_id`.
    pub async fn get(&self, key: &str, reader_agent_id: impl Into<String>) -> Option<Value> {
        let mut guard = self.inner.write().await;
        let value = guard.entries.get(key).map(|e| e.value.clone());
        guard.access_log.push(AccessLogEntry {
            action: ContextAccess::Get,
            key: key.to_owned(),
            agents: vec![reader_agent_id.into()],
            timestamp: chrono::Utc::now(),
        });
        value
    }

    /// Read a value without recording an access-log entry, for internal
    /// bookkeeping (e.g. checkpointing) that is not itself an agent read.
    pub async fn peek(&self, key: &str) -> Option<ContextEntry> {
        self.inner.read().await.entries.get(key).cloned()
    }

    /// Snapshot all entries, e.g. to embed in a `WorkflowState` checkpoint.
    pub async fn snapshot(&self) -> HashMap<String, ContextEntry> {
        self.inner.read().await.entries.clone()
    }

    /// Snapshot the full access log.
    pub async fn access_log(&self) -> Vec<AccessLogEntry> {
        self.inner.read().await.access_log.clone()
    }

    /// Restore from a checkpointed snapshot, e.g. on workflow resume.
    pub async fn restore(&self, entries: HashMap<String, ContextEntry>, access_log: Vec<AccessLogEntry>) {
        let mut guard = self.inner.write().await;
        guard.total_bytes = entries
            .iter()
            .map(|(k, v)| estimate_size(k, v))
            .sum();
        guard.entries = entries;
        guard.access_log = access_log;
    }

    /// Number of entries currently stored.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Whether the blackboard holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}

fn estimate_size(key: &str, entry: &ContextEntry) -> usize {
    key.len()
        + entry.agent_id.len()
        + entry.agent_role.len()
        + entry.description.len()
        + entry.value.to_string().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::WorkflowId;

    fn entry(agent: &str, value: serde_json::Value) -> ContextEntry {
        ContextEntry::new(agent, "coder", value, "test write")
    }

    #[tokio::test]
    async fn put_then_get_round_trips_value() {
        let ctx = SharedContext::new(WorkflowId::new(), 256, 1 << 20);
        ctx.put("plan_summary", entry("coder-0", serde_json::json!("done")))
            .await
            .unwrap();
        let value = ctx.get("plan_summary", "reviewer-0").await;
        assert_eq!(value, Some(serde_json::json!("done")));
    }

    #[tokio::test]
    async fn get_and_put_append_to_access_log() {
        let ctx = SharedContext::new(WorkflowId::new(), 256, 1 << 20);
        ctx.put("k", entry("coder-0", serde_json::json!(1))).await.unwrap();
        ctx.get("k", "reviewer-0").await;
        let log = ctx.access_log().await;
        assert_eq!(log.len(), 2);
        assert!(matches!(log[0].action, ContextAccess::Put));
        assert!(matches!(log[1].action, ContextAccess::Get));
    }

    #[tokio::test]
    async fn shadowed_write_does_not_change_value_but_is_logged() {
        let ctx = SharedContext::new(WorkflowId::new(), 256, 1 << 20);
        ctx.put("k", entry("coder-0", serde_json::json!("winner"))).await.unwrap();
        ctx.record_shadowed("k", "coder-1").await;
        assert_eq!(ctx.get("k", "reviewer-0").await, Some(serde_json::json!("winner")));
        let log = ctx.access_log().await;
        assert!(matches!(log[1].action, ContextAccess::Shadowed));
    }

    #[tokio::test]
    async fn exceeding_entry_cap_is_rejected() {
        let ctx = SharedContext::new(WorkflowId::new(), 1, 1 << 20);
        ctx.put("a", entry("coder-0", serde_json::json!(1))).await.unwrap();
        let result = ctx.put("b", entry("coder-0", serde_json::json!(2))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn overwriting_same_key_does_not_double_count_against_entry_cap() {
        let ctx = SharedContext::new(WorkflowId::new(), 1, 1 << 20);
        ctx.put("a", entry("coder-0", serde_json::json!(1))).await.unwrap();
        let result = ctx.put("a", entry("coder-0", serde_json::json!(2))).await;
        assert!(result.is_ok());
    }
}
