//! Configuration struct definitions.
//!
//! All types are self-contained with no dependencies on other internal
//! conclave crates. Every struct implements [`Default`] with production-sensible values so
//! that `Config::default()` is itself a valid, runnable configuration.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

/// Root configuration for the Conclave orchestration runtime.
///
/// Consolidates every recognized env-var-driven knob into one typed struct,
/// loaded once at startup via [`Config::from_env`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workflow engine concurrency and retry limits.
    pub engine: EngineSection,
    /// LLM adapter endpoint selection.
    pub llm: LlmSection,
    /// HITL feature flags and default deadlines.
    pub hitl: HitlSection,
    /// Tool execution network gating.
    pub network: NetworkSection,
    /// Session workspace root.
    pub workspace: WorkspaceSection,
    /// Logging level and format.
    pub logging: LoggingSection,
    /// HTTP server bind settings.
    pub server: ServerSection,
}

/// Workflow engine concurrency and retry limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Maximum stages running concurrently across all workflows.
    pub max_parallel_stages: usize,
    /// Maximum workflows admitted to run concurrently; further requests queue.
    pub max_active_workflows: usize,
    /// Default per-stage retry budget for transient failures.
    pub default_max_retries: u32,
    /// Maximum refinement iterations before a workflow fails permanently.
    pub max_refinement_iterations: u32,
    /// Default per-stage timeout, in seconds.
    pub default_stage_timeout_secs: u64,
    /// Whole-workflow wall-clock budget, in seconds (default 30 minutes).
    pub workflow_deadline_secs: u64,
    /// Maximum shared-context entries per workflow before writes are rejected.
    pub max_context_entries: usize,
    /// Maximum shared-context size in bytes per workflow.
    pub max_context_bytes: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_parallel_stages: 2,
            max_active_workflows: 10,
            default_max_retries: 1,
            max_refinement_iterations: 3,
            default_stage_timeout_secs: 120,
            workflow_deadline_secs: 1800,
            max_context_entries: 256,
            max_context_bytes: 4 * 1024 * 1024,
        }
    }
}

/// LLM adapter endpoint and credential configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Primary endpoint URL.
    pub endpoint: String,
    /// Model identifier sent to the provider.
    pub model: String,
    /// API key. Never logged or serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Additional endpoints for round-robin failover, beyond `endpoint`.
    pub extra_endpoints: Vec<String>,
    /// Cooldown applied to an endpoint after a failure, in seconds.
    pub endpoint_cooldown_secs: u64,
    /// Maximum concurrent in-flight requests per endpoint, matching typical
    /// local-model servers.
    pub max_concurrent_requests_per_endpoint: usize,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_owned(),
            model: "claude-sonnet".to_owned(),
            api_key: None,
            extra_endpoints: Vec::new(),
            endpoint_cooldown_secs: 30,
            max_concurrent_requests_per_endpoint: 2,
        }
    }
}

impl std::fmt::Debug for LlmSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSection")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("extra_endpoints", &self.extra_endpoints)
            .field("endpoint_cooldown_secs", &self.endpoint_cooldown_secs)
            .field("max_concurrent_requests_per_endpoint", &self.max_concurrent_requests_per_endpoint)
            .finish()
    }
}

impl Serialize for LlmSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LlmSection", 5)?;
        state.serialize_field("endpoint", &self.endpoint)?;
        state.serialize_field("model", &self.model)?;
        // api_key intentionally omitted.
        state.serialize_field("extra_endpoints", &self.extra_endpoints)?;
        state.serialize_field("endpoint_cooldown_secs", &self.endpoint_cooldown_secs)?;
        state.serialize_field(
            "max_concurrent_requests_per_endpoint",
            &self.max_concurrent_requests_per_endpoint,
        )?;
        state.end()
    }
}

/// HITL feature flags. Deadlines are per-request, not configured
/// globally here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HitlSection {
    /// Whether stages may raise HITL checkpoints dynamically at runtime
    /// (rather than only at plan-construction time).
    pub enable_dynamic_hitl: bool,
    /// Whether the `/workflow/pause` user-initiated pause endpoint is active.
    pub enable_pause_button: bool,
}

impl Default for HitlSection {
    fn default() -> Self {
        Self {
            enable_dynamic_hitl: true,
            enable_pause_button: true,
        }
    }
}

/// Network mode gating tool execution (C1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkModeConfig {
    /// Network-capable tools (`web_search`, `http_request`, `download_file`)
    /// are permitted.
    Online,
    /// Network-capable tools are rejected with
    /// [`conclave_core::EngineError::ToolUnavailableInMode`].
    Offline,
}

impl Default for NetworkModeConfig {
    fn default() -> Self {
        Self::Online
    }
}

/// Tool-registry network gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Startup network mode; may be flipped at runtime via the atomic cell
    /// in `conclave-tools`.
    pub mode: NetworkModeConfig,
}

/// Session workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSection {
    /// Root directory under which per-session workspace directories are
    /// created.
    pub default_workspace: String,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            default_workspace: "/home/user/workspace".to_owned(),
        }
    }
}

/// Logging level and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or
    /// `"conclave_engine=debug,info"`.
    pub filter: String,
    /// Emit structured JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            json: false,
        }
    }
}

/// HTTP server bind address and persisted-state root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind the `axum` router to.
    pub bind_addr: String,
    /// Root directory for persisted state: `sessions/`, `workflows/`.
    /// Kept distinct from `workspace.default_workspace`, which holds
    /// per-project working directories rather than engine-owned state.
    pub data_root: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_owned(),
            data_root: "./conclave-data".to_owned(),
        }
    }
}
