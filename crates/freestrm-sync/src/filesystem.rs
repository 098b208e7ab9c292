//! Task root filesystem access
//!
//! Every path handed to [`TaskRoot`] is relative to the task root and uses
//! `/` separators. Components that could escape the root (`..`, `.`, empty)
//! are dropped when the path is resolved.
//!
//! ## Design Decisions
//!
//! - **Atomic strm writes**: reference files are written to a temporary file
//!   and renamed into place.
//! - **Pruning**: removing an extra entry also removes ancestors left empty,
//!   up to but never including the task root.
//! - **Empty directories**: a scan reports a directory only when nothing
//!   below it is a file, and then only at its highest such level, so a
//!   local folder with no remote counterpart shows up in the diff.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, instrument, warn};

/// Local folder one task mirrors into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRoot {
    root: PathBuf,
}

impl TaskRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Absolute path of `relative` below the root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Every file below the root as a relative path, plus each directory
    /// whose subtree holds no files, recorded once at its highest level.
    /// A missing root is empty.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn scan(&self) -> std::io::Result<BTreeSet<String>> {
        let mut files = BTreeSet::new();
        let mut dirs = BTreeSet::new();
        let mut pending = vec![(self.root.clone(), String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let relative = if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                };
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    dirs.insert(relative.clone());
                    pending.push((entry.path(), relative));
                } else {
                    files.insert(relative);
                }
            }
        }

        let mut empty_dirs: BTreeSet<String> = BTreeSet::new();
        for dir in &dirs {
            let covered = ancestors(dir).any(|a| empty_dirs.contains(a));
            if !covered && !has_descendant(&files, dir) {
                empty_dirs.insert(dir.clone());
            }
        }
        debug!(files = files.len(), empty_dirs = empty_dirs.len(), "Scanned task root");
        files.extend(empty_dirs);
        Ok(files)
    }

    /// Create `relative` and its parents as directories.
    pub async fn create_dir(&self, relative: &str) -> std::io::Result<()> {
        fs::create_dir_all(self.resolve(relative)).await
    }

    /// Write a reference file atomically.
    pub async fn write_strm(&self, relative: &str, content: &str) -> std::io::Result<()> {
        let target = self.resolve(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = {
            let mut p = target.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };
        fs::write(&tmp_path, content.as_bytes()).await?;
        fs::rename(&tmp_path, &target).await
    }

    /// Open `relative` for writing, truncating it and creating parents.
    pub async fn create_file(&self, relative: &str) -> std::io::Result<fs::File> {
        let target = self.resolve(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::File::create(&target).await
    }

    /// Delete `relative` (a file or a directory tree) and prune emptied
    /// ancestors. Returns whether anything was removed.
    #[instrument(skip(self))]
    pub async fn remove(&self, relative: &str) -> std::io::Result<bool> {
        let target = self.resolve(relative);
        if target == self.root {
            return Ok(false);
        }
        let removed = match fs::symlink_metadata(&target).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&target).await.map(|_| true),
            Ok(_) => fs::remove_file(&target).await.map(|_| true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }?;
        self.prune_ancestors(&target).await;
        Ok(removed)
    }

    async fn prune_ancestors(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            match fs::remove_dir(dir).await {
                Ok(()) => debug!(dir = %dir.display(), "Pruned empty directory"),
                // Not empty, or already gone: stop climbing.
                Err(_) => break,
            }
            current = dir.parent();
        }
    }

    /// Remove everything below the root, keeping the root itself.
    pub async fn clear(&self) -> std::io::Result<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove entry"),
            }
        }
        Ok(removed)
    }
}

/// Proper ancestors of a relative path, nearest last: `a/b/c` -> `a`, `a/b`.
fn ancestors(relative: &str) -> impl Iterator<Item = &str> {
    relative
        .match_indices('/')
        .map(move |(i, _)| &relative[..i])
}

/// Whether `paths` holds anything below the directory `dir`.
pub fn has_descendant(paths: &BTreeSet<String>, dir: &str) -> bool {
    let prefix = format!("{dir}/");
    paths
        .range(prefix.clone()..)
        .next()
        .is_some_and(|p| p.starts_with(&prefix))
}
