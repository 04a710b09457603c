use crate::error::{Result, RtError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// A crash mid-write leaves the previous object or config intact.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Remove every path (file or directory tree), skipping ones that don't exist.
///
/// Every path is attempted; failures are collected into [`RtError::Cleanup`]
/// so one stuck file does not hide the others.
pub fn remove_paths(paths: &[PathBuf]) -> Result<()> {
    let mut failures = Vec::new();
    for path in paths {
        let outcome = match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
            Ok(_) => std::fs::remove_file(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => tracing::debug!(path = %path.display(), "removed"),
            Err(e) => failures.push(format!("{}: {e}", path.display())),
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(RtError::Cleanup(failures))
    }
}

/// Recursively copy `src` into `dst`, creating `dst` as needed.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Immediate subdirectories of `dir`, skipping hidden ones, sorted by name.
pub fn visible_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/APPLICATION.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn remove_paths_handles_files_dirs_and_missing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("planfile");
        let cache = dir.path().join(".terraform/modules");
        std::fs::write(&file, "plan").unwrap();
        std::fs::create_dir_all(&cache).unwrap();

        remove_paths(&[
            file.clone(),
            dir.path().join(".terraform"),
            dir.path().join("never-created"),
        ])
        .unwrap();

        assert!(!file.exists());
        assert!(!dir.path().join(".terraform").exists());
    }

    #[test]
    fn copy_tree_copies_nested_files() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("slots/main")).unwrap();
        std::fs::write(src.path().join("slots/main/main.tf.tpl"), "x").unwrap();
        copy_tree(src.path(), &dst.path().join("hello")).unwrap();
        assert!(dst.path().join("hello/slots/main/main.tf.tpl").exists());
    }

    #[test]
    fn visible_subdirs_skips_hidden_and_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::create_dir_all(dir.path().join(".terraform")).unwrap();
        std::fs::write(dir.path().join("main.tf"), "").unwrap();
        let names: Vec<_> = visible_subdirs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
