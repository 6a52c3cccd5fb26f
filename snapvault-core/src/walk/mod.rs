//! File-tree enumeration. The spec externalizes directory walking as a
//! collaborator; `walkdir` is the concrete default, matching how the
//! teacher's own pack writer enumerates a tree.

use std::path::{Path, PathBuf};

use crate::change::detector::is_always_excluded_dir;
use crate::error::{Result, SnapvaultError};

/// One entry yielded by an `Enumerator`.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Abstraction over "walk this directory tree, call me back for each
/// regular file, skip the things exclusion policy says to skip". Kept as
/// a trait so tests (and, eventually, alternate backends) can swap in a
/// synthetic tree without touching disk.
pub trait Enumerator {
    fn enumerate(
        &self,
        root: &Path,
        excludes: &[PathBuf],
        visit: &mut dyn FnMut(&WalkEntry) -> Result<()>,
        on_error: &mut dyn FnMut(&Path, &SnapvaultError),
    ) -> Result<()>;
}

/// Default enumerator: depth-first walk via `walkdir`, always skipping
/// `lost+found` directories plus whatever the caller's `excludes` list
/// names. A single unreadable file reports through `on_error` and the
/// walk continues, matching the per-file "continue" error policy.
pub struct WalkdirEnumerator;

impl Enumerator for WalkdirEnumerator {
    fn enumerate(
        &self,
        root: &Path,
        excludes: &[PathBuf],
        visit: &mut dyn FnMut(&WalkEntry) -> Result<()>,
        on_error: &mut dyn FnMut(&Path, &SnapvaultError),
    ) -> Result<()> {
        let walker = walkdir::WalkDir::new(root).into_iter().filter_entry(|entry| {
            if entry.file_type().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if is_always_excluded_dir(name) {
                        return false;
                    }
                }
            }
            !excludes.iter().any(|excluded| entry.path() == excluded)
        });

        for result in walker {
            match result {
                Ok(dir_entry) => {
                    let entry = WalkEntry {
                        path: dir_entry.path().to_path_buf(),
                        is_dir: dir_entry.file_type().is_dir(),
                    };
                    if entry.is_dir {
                        continue;
                    }
                    if let Err(e) = visit(&entry) {
                        on_error(&entry.path, &e);
                    }
                }
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let io_err = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk error"));
                    on_error(&path, &SnapvaultError::io_in(io_err));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn visits_regular_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();

        let mut visited = Vec::new();
        WalkdirEnumerator
            .enumerate(
                dir.path(),
                &[],
                &mut |entry| {
                    visited.push(entry.path.clone());
                    Ok(())
                },
                &mut |_, _| panic!("unexpected error"),
            )
            .unwrap();

        assert_eq!(visited.len(), 2);
    }

    #[test]
    fn skips_lost_and_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lost+found")).unwrap();
        fs::write(dir.path().join("lost+found/orphan"), b"x").unwrap();
        fs::write(dir.path().join("keep.txt"), b"y").unwrap();

        let mut visited = Vec::new();
        WalkdirEnumerator
            .enumerate(
                dir.path(),
                &[],
                &mut |entry| {
                    visited.push(entry.path.clone());
                    Ok(())
                },
                &mut |_, _| {},
            )
            .unwrap();

        assert_eq!(visited.len(), 1);
        assert!(visited[0].ends_with("keep.txt"));
    }

    #[test]
    fn honors_explicit_excludes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("skip")).unwrap();
        fs::write(dir.path().join("skip/file"), b"x").unwrap();
        fs::write(dir.path().join("keep.txt"), b"y").unwrap();

        let mut visited = Vec::new();
        WalkdirEnumerator
            .enumerate(
                dir.path(),
                &[dir.path().join("skip")],
                &mut |entry| {
                    visited.push(entry.path.clone());
                    Ok(())
                },
                &mut |_, _| {},
            )
            .unwrap();

        assert_eq!(visited.len(), 1);
        assert!(visited[0].ends_with("keep.txt"));
    }
}
