//! Per-session workspace resolution and atomic artifact application.

use crate::boundary::resolve_within;
use crate::slug::slugify;
use conclave_core::{Artifact, ArtifactAction, EngineError, EngineResult, SessionId};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Resolves and binds a directory under `root` for each session, and
/// applies [`Artifact`]s to it with created/modified/deleted semantics,
/// in a single confinement mode with no escape-approval policy.
pub struct WorkspaceManager {
    root: PathBuf,
    bindings: DashMap<SessionId, PathBuf>,
}

impl WorkspaceManager {
    /// Construct a manager rooted at `root` (e.g. `$DEFAULT_WORKSPACE`).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bindings: DashMap::new(),
        }
    }

    /// Look up the workspace directory already bound to a session, if any.
    #[must_use]
    pub fn binding(&self, session_id: &SessionId) -> Option<PathBuf> {
        self.bindings.get(session_id).map(|p| p.clone())
    }

    /// Resolve (creating if necessary) the workspace directory for a
    /// session.
    ///
    /// The first call for a session slugifies `user_message` and probes
    /// `name`, `name_2`, `name_3`, … for the first non-existent directory,
    /// then persists the binding so later calls with a different message
    /// never drift the session to a new directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if directory creation fails.
    pub async fn get_or_create_workspace(
        &self,
        session_id: &SessionId,
        user_message: &str,
    ) -> EngineResult<PathBuf> {
        if let Some(existing) = self.binding(session_id) {
            return Ok(existing);
        }

        fs::create_dir_all(&self.root).await?;

        let base_slug = slugify(user_message);
        let mut candidate = self.root.join(&base_slug);
        let mut ordinal = 2u32;
        while fs::metadata(&candidate).await.is_ok() {
            candidate = self.root.join(format!("{base_slug}_{ordinal}"));
            ordinal = ordinal.saturating_add(1);
        }

        fs::create_dir_all(&candidate).await?;
        info!(session_id = %session_id, path = %candidate.display(), "workspace bound");
        self.bindings.insert(session_id.clone(), candidate.clone());
        Ok(candidate)
    }

    /// Explicitly bind `session_id` to `path`, creating it if necessary,
    /// overriding whatever slug-derived directory (if any) was bound
    /// before. Used by the `/workspace/set` API surface to point a session
    /// at an existing project directory instead of a freshly slugified one.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if the directory cannot be created.
    pub async fn set_binding(&self, session_id: &SessionId, path: impl Into<PathBuf>) -> EngineResult<PathBuf> {
        let path = path.into();
        fs::create_dir_all(&path).await?;
        info!(session_id = %session_id, path = %path.display(), "workspace binding set explicitly");
        self.bindings.insert(session_id.clone(), path.clone());
        Ok(path)
    }

    /// Apply an artifact to `session_root` (the path returned by
    /// [`Self::get_or_create_workspace`]), implementing:
    ///
    /// - `Created`/`Modified`: write to a sibling temp file, then rename
    ///   over the target (atomic on the same filesystem). `Modified` first
    ///   copies any existing target to a `.bak` sibling.
    /// - `Deleted`: unlinks the target.
    ///
    /// Returns the artifact with `saved_path` populated.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PathEscape`] if `relative_path` would resolve
    /// outside `session_root`, or [`EngineError::Io`] on a filesystem
    /// failure.
    pub async fn apply_artifact(
        &self,
        session_root: &Path,
        mut artifact: Artifact,
    ) -> EngineResult<Artifact> {
        let target = resolve_within(session_root, &artifact.relative_path)?;

        if artifact.action == ArtifactAction::Modified && fs::metadata(&target).await.is_err() {
            artifact.action = ArtifactAction::Created;
        }

        match artifact.action {
            ArtifactAction::Created | ArtifactAction::Modified => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).await?;
                }
                if artifact.action == ArtifactAction::Modified && fs::metadata(&target).await.is_ok() {
                    let backup = backup_path(&target);
                    fs::copy(&target, &backup).await?;
                    debug!(target = %target.display(), backup = %backup.display(), "backed up prior artifact");
                }
                let tmp = temp_sibling(&target);
                fs::write(&tmp, artifact.content.as_bytes()).await?;
                fs::rename(&tmp, &target).await?;
            },
            ArtifactAction::Deleted => {
                match fs::remove_file(&target).await {
                    Ok(()) => {},
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        warn!(target = %target.display(), "delete requested for artifact that no longer exists");
                    },
                    Err(e) => return Err(e.into()),
                }
            },
        }

        artifact.saved_path = Some(target.display().to_string());
        Ok(artifact)
    }

    /// List files under `path` (relative to `session_root`) up to `depth`
    /// levels, returning paths relative to `session_root`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PathEscape`] if `path` would escape
    /// `session_root`, or [`EngineError::Io`] if the directory cannot be read.
    pub async fn list_files(
        &self,
        session_root: &Path,
        path: &str,
        depth: usize,
    ) -> EngineResult<Vec<String>> {
        let target = resolve_within(session_root, path)?;
        let canonical_root = session_root
            .canonicalize()
            .unwrap_or_else(|_| session_root.to_path_buf());

        let mut entries = Vec::new();
        let mut stack = vec![(target, 0usize)];
        while let Some((dir, level)) = stack.pop() {
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let entry_path = entry.path();
                let rel = entry_path
                    .strip_prefix(&canonical_root)
                    .unwrap_or(&entry_path)
                    .display()
                    .to_string();
                entries.push(rel);
                if level.saturating_add(1) < depth.max(1) && entry.file_type().await.is_ok_and(|ft| ft.is_dir()) {
                    stack.push((entry_path, level.saturating_add(1)));
                }
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Read a file's content as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PathEscape`] if `relative_path` would escape
    /// `session_root`, or [`EngineError::Io`]/[`EngineError::Integrity`] if
    /// the file cannot be read or is not valid UTF-8.
    pub async fn read_file(&self, session_root: &Path, relative_path: &str) -> EngineResult<String> {
        let target = resolve_within(session_root, relative_path)?;
        let bytes = fs::read(&target).await?;
        String::from_utf8(bytes)
            .map_err(|e| EngineError::Integrity(format!("{relative_path} is not valid UTF-8: {e}")))
    }

    /// Delete a regular file under `session_root`.
    ///
    /// Per the safety invariant, the target must already exist as a
    /// regular file; directories and symlinks are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PathEscape`] on boundary violation,
    /// [`EngineError::Integrity`] if the target is not a regular file, or
    /// [`EngineError::Io`] on failure.
    pub async fn delete_file(&self, session_root: &Path, relative_path: &str) -> EngineResult<()> {
        let target = resolve_within(session_root, relative_path)?;
        let metadata = fs::symlink_metadata(&target).await?;
        if !metadata.is_file() {
            return Err(EngineError::Integrity(format!(
                "{relative_path} is not a regular file"
            )));
        }
        fs::remove_file(&target).await?;
        Ok(())
    }
}

fn backup_path(target: &Path) -> PathBuf {
    let mut backup = target.as_os_str().to_owned();
    backup.push(".bak");
    PathBuf::from(backup)
}

fn temp_sibling(target: &Path) -> PathBuf {
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(format!(".tmp-{}", Uuid::new_v4()));
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::SessionId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn disambiguates_repeated_slugs() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let a = manager
            .get_or_create_workspace(&SessionId::from("s1"), "fix the bug")
            .await
            .unwrap();
        let b = manager
            .get_or_create_workspace(&SessionId::from("s2"), "fix the bug")
            .await
            .unwrap();
        assert_ne!(a, b);
        assert!(b.ends_with("fix-the-bug_2"));
    }

    #[tokio::test]
    async fn binding_is_stable_across_calls() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session = SessionId::from("s1");
        let first = manager.get_or_create_workspace(&session, "fix the bug").await.unwrap();
        let second = manager
            .get_or_create_workspace(&session, "a completely different message")
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn created_artifact_is_written_atomically() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session_root = manager
            .get_or_create_workspace(&SessionId::from("s1"), "add a feature")
            .await
            .unwrap();

        let artifact = Artifact::new("src/lib.rs", "fn main() {}", ArtifactAction::Created);
        let applied = manager.apply_artifact(&session_root, artifact).await.unwrap();
        assert!(applied.saved_path.is_some());
        let content = fs::read_to_string(session_root.join("src/lib.rs")).await.unwrap();
        assert_eq!(content, "fn main() {}");
    }

    #[tokio::test]
    async fn modifying_existing_file_creates_backup() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session_root = manager
            .get_or_create_workspace(&SessionId::from("s1"), "edit a file")
            .await
            .unwrap();

        manager
            .apply_artifact(
                &session_root,
                Artifact::new("notes.md", "original", ArtifactAction::Created),
            )
            .await
            .unwrap();
        manager
            .apply_artifact(
                &session_root,
                Artifact::new("notes.md", "updated", ArtifactAction::Modified),
            )
            .await
            .unwrap();

        let backup = fs::read_to_string(session_root.join("notes.md.bak")).await.unwrap();
        let current = fs::read_to_string(session_root.join("notes.md")).await.unwrap();
        assert_eq!(backup, "original");
        assert_eq!(current, "updated");
    }

    #[tokio::test]
    async fn modifying_a_path_with_no_prior_file_is_treated_as_created() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session_root = manager
            .get_or_create_workspace(&SessionId::from("s1"), "refine without a prior write")
            .await
            .unwrap();

        let artifact = Artifact::new("src/new.rs", "fn x() {}", ArtifactAction::Modified);
        let applied = manager.apply_artifact(&session_root, artifact).await.unwrap();
        assert_eq!(applied.action, ArtifactAction::Created);
        assert!(fs::metadata(session_root.join("src/new.rs.bak")).await.is_err());
    }

    #[tokio::test]
    async fn deleting_nonexistent_file_is_not_an_error() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session_root = manager
            .get_or_create_workspace(&SessionId::from("s1"), "remove a file")
            .await
            .unwrap();
        let artifact = Artifact::new("ghost.txt", "", ArtifactAction::Deleted);
        assert!(manager.apply_artifact(&session_root, artifact).await.is_ok());
    }

    #[tokio::test]
    async fn list_files_reports_relative_paths() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session_root = manager
            .get_or_create_workspace(&SessionId::from("s1"), "list stuff")
            .await
            .unwrap();
        manager
            .apply_artifact(&session_root, Artifact::new("a.txt", "x", ArtifactAction::Created))
            .await
            .unwrap();
        manager
            .apply_artifact(&session_root, Artifact::new("sub/b.txt", "y", ArtifactAction::Created))
            .await
            .unwrap();

        let files = manager.list_files(&session_root, ".", 1).await.unwrap();
        assert!(files.iter().any(|f| f.ends_with("a.txt")));
    }

    #[tokio::test]
    async fn read_file_roundtrips_written_content() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session_root = manager
            .get_or_create_workspace(&SessionId::from("s1"), "read stuff")
            .await
            .unwrap();
        manager
            .apply_artifact(&session_root, Artifact::new("a.txt", "hello", ArtifactAction::Created))
            .await
            .unwrap();
        let content = manager.read_file(&session_root, "a.txt").await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn delete_file_removes_regular_file() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session_root = manager
            .get_or_create_workspace(&SessionId::from("s1"), "delete stuff")
            .await
            .unwrap();
        manager
            .apply_artifact(&session_root, Artifact::new("a.txt", "hello", ArtifactAction::Created))
            .await
            .unwrap();
        manager.delete_file(&session_root, "a.txt").await.unwrap();
        assert!(fs::metadata(session_root.join("a.txt")).await.is_err());
    }

    #[tokio::test]
    async fn delete_file_rejects_directory_target() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session_root = manager
            .get_or_create_workspace(&SessionId::from("s1"), "delete a dir")
            .await
            .unwrap();
        fs::create_dir(session_root.join("subdir")).await.unwrap();
        let result = manager.delete_file(&session_root, "subdir").await;
        assert!(matches!(result, Err(EngineError::Integrity(_))));
    }

    #[tokio::test]
    async fn escaping_artifact_path_is_rejected() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session_root = manager
            .get_or_create_workspace(&SessionId::from("s1"), "try to escape")
            .await
            .unwrap();
        let artifact = Artifact::new("../../etc/passwd", "pwned", ArtifactAction::Created);
        let result = manager.apply_artifact(&session_root, artifact).await;
        assert!(matches!(result, Err(EngineError::PathEscape(_))));
    }

    #[tokio::test]
    async fn set_binding_overrides_any_prior_slug_binding() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let session = SessionId::from("s1");
        let slugged = manager.get_or_create_workspace(&session, "fix the bug").await.unwrap();

        let explicit = root.path().join("an-existing-project");
        let bound = manager.set_binding(&session, explicit.clone()).await.unwrap();
        assert_eq!(bound, explicit);
        assert_ne!(manager.binding(&session).unwrap(), slugged);
        assert_eq!(manager.binding(&session).unwrap(), explicit);
    }
}
