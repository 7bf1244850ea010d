//! Boundary-checked path resolution.
//!
//! No auto-allow globs, no escape-approval modes: every stage in this
//! runtime is strictly confined to its own session workspace, with no
//! "ask the user to approve an out-of-workspace write" path at all.

use conclave_core::EngineError;
use std::path::{Component, Path, PathBuf};

/// Resolve `relative` against `root`, rejecting any path that would escape
/// `root` via `..` components or a symlink.
///
/// # Errors
///
/// Returns [`EngineError::PathEscape`] if the resolved path is not
/// contained within `root`.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, EngineError> {
    let relative_path = Path::new(relative);
    if relative_path.is_absolute() {
        return Err(EngineError::PathEscape(relative.to_owned()));
    }
    for component in relative_path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(EngineError::PathEscape(relative.to_owned()));
            },
        }
    }

    let joined = root.join(relative_path);

    // Canonicalize the deepest existing ancestor to catch a symlink planted
    // partway down the path, then re-append the remaining (not-yet-created)
    // components.
    let mut existing = joined.clone();
    let mut remainder: Vec<&std::ffi::OsStr> = Vec::new();
    while !existing.exists() {
        if let Some(parent) = existing.parent() {
            if let Some(name) = existing.file_name() {
                remainder.push(name);
            }
            existing = parent.to_path_buf();
        } else {
            break;
        }
    }
    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let canonical_existing = existing.canonicalize().unwrap_or(existing);
    let mut resolved = canonical_existing;
    for name in remainder.into_iter().rev() {
        resolved.push(name);
    }

    if !resolved.starts_with(&canonical_root) {
        return Err(EngineError::PathEscape(relative.to_owned()));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_parent_dir_traversal() {
        let dir = TempDir::new().unwrap();
        let result = resolve_within(dir.path(), "../escape.txt");
        assert!(matches!(result, Err(EngineError::PathEscape(_))));
    }

    #[test]
    fn rejects_absolute_paths() {
        let dir = TempDir::new().unwrap();
        let result = resolve_within(dir.path(), "/etc/passwd");
        assert!(matches!(result, Err(EngineError::PathEscape(_))));
    }

    #[test]
    fn accepts_plain_relative_path() {
        let dir = TempDir::new().unwrap();
        let result = resolve_within(dir.path(), "src/main.rs").unwrap();
        assert!(result.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let link = dir.path().join("escape_link");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        let result = resolve_within(dir.path(), "escape_link/file.txt");
        assert!(matches!(result, Err(EngineError::PathEscape(_))));
    }
}
