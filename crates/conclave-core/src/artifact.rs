//! File intents produced by agent handlers, applied through the Workspace Manager.

use serde::{Deserialize, Serialize};

/// What should happen to the file at `relative_path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactAction {
    /// A new file.
    Created,
    /// An existing file is overwritten.
    Modified,
    /// The file is removed.
    Deleted,
}

/// A file intent emitted by a handler, not yet applied to the workspace.
///
/// Invariant: `relative_path`, after normalization, must lie within the
/// session workspace root — any `..` traversal is rejected by the Workspace
/// Manager before this artifact is ever applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Path relative to the session workspace root.
    pub relative_path: String,
    /// Best-effort language tag (e.g. `"python"`), used for display only.
    pub language: Option<String>,
    /// File content. Empty for `Deleted`.
    pub content: String,
    /// The intended filesystem action.
    pub action: ArtifactAction,
    /// Absolute path the artifact was actually written to, once applied.
    pub saved_path: Option<String>,
    /// Size of `content` in bytes.
    pub size_bytes: usize,
    /// Content digest (hex-encoded SHA-256), computed at construction time.
    pub digest: String,
}

impl Artifact {
    /// Build an artifact, computing `size_bytes` and `digest` from `content`.
    #[must_use]
    pub fn new(relative_path: impl Into<String>, content: impl Into<String>, action: ArtifactAction) -> Self {
        let content = content.into();
        let size_bytes = content.len();
        let digest = digest_hex(content.as_bytes());
        Self {
            relative_path: relative_path.into(),
            language: None,
            content,
            action,
            saved_path: None,
            size_bytes,
            digest,
        }
    }

    /// Attach a language tag.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Compute the SHA-256 digest of `bytes`, hex-encoded.
///
/// Used for artifact content-addressing (idempotence checks, conversation
/// store manifests) — not a security boundary.
#[must_use]
pub fn digest_hex(bytes: &[u8]) -> String {
    use sha2::Digest as _;
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest_hex(b"hello"), digest_hex(b"hello"));
        assert_ne!(digest_hex(b"hello"), digest_hex(b"world"));
    }

    #[test]
    fn new_computes_size_and_digest() {
        let artifact = Artifact::new("a.py", "print(1)".to_string(), ArtifactAction::Created);
        assert_eq!(artifact.size_bytes, 8);
        assert_eq!(artifact.digest, digest_hex(b"print(1)"));
    }
}
