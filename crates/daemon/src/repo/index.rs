//! Rebuilding in-memory indices from the on-disk layout.
//!
//! Every store keeps its index only in memory. On startup the store walks its
//! root directory once and loads one entity per entry. Entries that fail to
//! load are logged and skipped so one corrupt record cannot keep the service
//! down. The only thing that aborts a build is cancellation.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::error::{RepoError, Result};

/// Which entries under the root hold entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// One subdirectory per entity.
    Directories,
    /// One `.json` file per entity.
    Files,
}

impl EntryKind {
    fn matches(self, entry: &walkdir::DirEntry) -> bool {
        let file_type = entry.file_type();
        match self {
            Self::Directories => file_type.is_dir(),
            Self::Files => {
                file_type.is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "json")
            }
        }
    }
}

/// An entry that could not be loaded during an index build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Path of the entry.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Walks the immediate children of `root` in file-name order, calling `load`
/// for each entry of `kind` and `insert` for each one that loads.
///
/// Returns the entries that were skipped. Fails with
/// [`RepoError::Cancelled`] if `cancel` fires before the walk completes.
pub fn build<T>(
    root: &Path,
    kind: EntryKind,
    cancel: &CancellationToken,
    mut load: impl FnMut(&Path) -> Result<T>,
    mut insert: impl FnMut(T),
) -> Result<Vec<SkippedEntry>> {
    let mut skipped = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        if cancel.is_cancelled() {
            return Err(RepoError::Cancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                tracing::error!("Loading entry {:?}: {}", path, e);
                skipped.push(SkippedEntry {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if !kind.matches(&entry) {
            tracing::debug!("Ignoring {:?} while indexing {:?}", entry.path(), root);
            continue;
        }

        match load(entry.path()) {
            Ok(value) => insert(value),
            Err(e) => {
                tracing::error!("Loading entry {:?}: {}", entry.path(), e);
                skipped.push(SkippedEntry {
                    path: entry.path().to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(RepoError::Cancelled);
    }
    Ok(skipped)
}
