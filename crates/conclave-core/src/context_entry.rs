//! Shared-context entry and access-log types (C5 data model).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One value in the per-workflow shared-context blackboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Id of the agent (stage) that wrote this entry.
    pub agent_id: String,
    /// Role of the writing agent.
    pub agent_role: String,
    /// The stored value.
    pub value: Value,
    /// Human-readable description of what this key holds.
    pub description: String,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
}

impl ContextEntry {
    /// Construct a new entry stamped with the current time.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        agent_role: impl Into<String>,
        value: Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_role: agent_role.into(),
            value,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Kind of access recorded in the shared-context access log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextAccess {
    /// A write (`put`).
    Put,
    /// A read (`get`).
    Get,
    /// A write that lost a same-key race within a parallel group and was
    /// recorded but not applied.
    Shadowed,
}

/// One entry in the append-only shared-context access log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// What kind of access this was.
    pub action: ContextAccess,
    /// The key accessed.
    pub key: String,
    /// Agent(s) involved — the sole writer for `Put`/`Shadowed`, the reader
    /// for `Get`.
    pub agents: Vec<String>,
    /// When the access occurred.
    pub timestamp: DateTime<Utc>,
}
