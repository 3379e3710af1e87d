//! Filesystem-backed file store.
//!
//! Each file lives in its own directory named after its ID:
//!
//! ```text
//! <root>/<file-id>/header.json   metadata
//! <root>/<file-id>/file          raw content
//! ```
//!
//! The store mirrors the headers in two in-memory indices (by ID and by
//! owner) guarded by one `RwLock`. Writers hold the write lock for the whole
//! disk operation plus index update, so readers never see an index entry
//! whose files are half written or half removed.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use domain::{sort_for_listing, File, FileHeader, FileId, UserId};
use tokio_util::sync::CancellationToken;

use super::error::{RepoError, Result};
use super::fs::{
    check_entry_name, ensure_dir, read_json, remove_dir_all, validate_component, write_json_atomic,
};
use super::index::{self, EntryKind, SkippedEntry};

/// Name of the metadata document inside a file directory.
pub const HEADER_FILE_NAME: &str = "header.json";

/// Name of the content blob inside a file directory.
pub const CONTENT_FILE_NAME: &str = "file";

/// The by-ID table plus the by-owner handles into it.
#[derive(Debug, Default)]
struct FileIndex {
    by_id: HashMap<FileId, FileHeader>,
    by_owner: HashMap<UserId, BTreeSet<FileId>>,
}

impl FileIndex {
    fn insert(&mut self, header: FileHeader) {
        self.by_owner
            .entry(header.owner.clone())
            .or_default()
            .insert(header.id.clone());
        self.by_id.insert(header.id.clone(), header);
    }

    fn remove(&mut self, id: &FileId) -> Option<FileHeader> {
        let header = self.by_id.remove(id)?;
        self.unlink_owner(&header.owner, id);
        Some(header)
    }

    fn unlink_owner(&mut self, owner: &UserId, id: &FileId) {
        if let Some(ids) = self.by_owner.get_mut(owner) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_owner.remove(owner);
            }
        }
    }
}

/// Thread-safe store for uploaded files.
pub struct FileRepo {
    dir: PathBuf,
    index: RwLock<FileIndex>,
    skipped: Vec<SkippedEntry>,
}

impl FileRepo {
    /// Opens the store rooted at `dir`, creating it if needed, and rebuilds
    /// the index from disk.
    ///
    /// Entries that fail to load are logged and reported by
    /// [`FileRepo::skipped`]. If `cancel` fires during the rebuild the store
    /// is discarded and [`RepoError::Cancelled`] is returned.
    pub fn open(dir: impl AsRef<Path>, cancel: &CancellationToken) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_dir(&dir)?;

        let mut repo = Self {
            dir,
            index: RwLock::new(FileIndex::default()),
            skipped: Vec::new(),
        };

        let skipped = {
            let mut index = repo.write_index()?;
            index::build(
                &repo.dir,
                EntryKind::Directories,
                cancel,
                load_header,
                |header| index.insert(header),
            )?
        };
        repo.skipped = skipped;

        tracing::info!(
            "Loaded {} files from {:?} ({} skipped)",
            repo.len()?,
            repo.dir,
            repo.skipped.len()
        );
        Ok(repo)
    }

    /// Returns the store root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the entries that could not be loaded when the store opened.
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Returns the number of indexed files.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_index()?.by_id.len())
    }

    /// Returns true if no files are indexed.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Persists `file` and indexes it.
    ///
    /// Stored files are never replaced: saving an ID that is already indexed
    /// fails with [`RepoError::DuplicateFileId`] before anything is written.
    ///
    /// The content is streamed to a temporary blob, the header is published
    /// atomically, and only then is the blob renamed into place. A save that
    /// is interrupted therefore leaves no content file, so the directory is
    /// skipped when the store is reopened. A save that fails is cleaned up.
    pub fn save(&self, file: File) -> Result<()> {
        let File { mut header, mut data } = file;
        validate_component("file ID", header.id.as_str())?;
        if header.owner.is_empty() {
            return Err(RepoError::Validation("file owner cannot be empty".to_string()));
        }

        let mut index = self.write_index()?;
        if index.by_id.contains_key(&header.id) {
            return Err(RepoError::DuplicateFileId(header.id));
        }

        let file_dir = self.dir.join(header.id.as_str());
        header.location = file_dir.join(CONTENT_FILE_NAME);

        let written = match write_entry(&file_dir, &header, &mut data) {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = remove_dir_all(&file_dir) {
                    tracing::warn!(
                        "Removing {:?} after failed save: {}",
                        file_dir,
                        cleanup
                    );
                }
                return Err(e);
            }
        };

        tracing::debug!(
            "Saved file {} ({} bytes) for user {}",
            header.id,
            written,
            header.owner
        );

        index.insert(header);
        Ok(())
    }

    /// Returns the header for `id`.
    pub fn get(&self, id: &FileId) -> Result<FileHeader> {
        let index = self.read_index()?;
        index
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| RepoError::FileNotFound(id.clone()))
    }

    /// Returns a snapshot of every header owned by `owner`, in listing order.
    pub fn list_by_user(&self, owner: &UserId) -> Result<Vec<FileHeader>> {
        let index = self.read_index()?;
        let mut headers: Vec<FileHeader> = index
            .by_owner
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|id| index.by_id.get(id).cloned())
            .collect();
        drop(index);

        sort_for_listing(&mut headers);
        Ok(headers)
    }

    /// Returns a snapshot of every indexed header, in listing order.
    pub fn list_all(&self) -> Result<Vec<FileHeader>> {
        let mut headers: Vec<FileHeader> = self.read_index()?.by_id.values().cloned().collect();
        sort_for_listing(&mut headers);
        Ok(headers)
    }

    /// Deletes `ids`, all of which must belong to `owner`.
    ///
    /// Ownership of every ID is checked before anything is removed. Deletion
    /// then proceeds in the given order; a failure partway through leaves the
    /// earlier deletions applied and returns [`RepoError::PartialDelete`].
    pub fn delete(&self, owner: &UserId, ids: &[FileId]) -> Result<()> {
        if owner.is_empty() {
            return Err(RepoError::Validation(
                "file owner ID cannot be empty".to_string(),
            ));
        }
        if ids.is_empty() {
            return Ok(());
        }

        let mut index = self.write_index()?;
        for id in ids {
            let owned = index.by_id.get(id).is_some_and(|h| h.owner == *owner);
            if !owned {
                return Err(RepoError::FileNotOwned {
                    file_id: id.clone(),
                    owner: owner.clone(),
                });
            }
        }

        let mut deleted = 0;
        for id in ids {
            if !index.by_id.contains_key(id) {
                // Listed twice; the first occurrence already removed it.
                continue;
            }
            self.remove_entity(&mut index, id)
                .map_err(|e| RepoError::PartialDelete {
                    deleted,
                    file_id: id.clone(),
                    source: Box::new(e),
                })?;
            deleted += 1;
        }

        tracing::info!("Deleted {} files for user {}", deleted, owner);
        Ok(())
    }

    /// Deletes every file whose expiration is at or before `cutoff`.
    ///
    /// Returns how many files were deleted.
    pub fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut index = self.write_index()?;

        let mut expired: Vec<FileHeader> = index
            .by_id
            .values()
            .filter(|h| h.expires.is_some_and(|expires| expires <= cutoff))
            .cloned()
            .collect();
        sort_for_listing(&mut expired);

        let mut deleted = 0;
        for header in &expired {
            self.remove_entity(&mut index, &header.id)
                .map_err(|e| RepoError::PartialDelete {
                    deleted,
                    file_id: header.id.clone(),
                    source: Box::new(e),
                })?;
            deleted += 1;
        }

        if deleted > 0 {
            tracing::debug!("Deleted {} files expired before {}", deleted, cutoff);
        }
        Ok(deleted)
    }

    fn remove_entity(&self, index: &mut FileIndex, id: &FileId) -> Result<()> {
        remove_dir_all(&self.dir.join(id.as_str()))?;
        index.remove(id);
        Ok(())
    }

    fn read_index(&self) -> Result<RwLockReadGuard<'_, FileIndex>> {
        self.index.read().map_err(|_| RepoError::LockPoisoned {
            context: "file index read".to_string(),
        })
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, FileIndex>> {
        self.index.write().map_err(|_| RepoError::LockPoisoned {
            context: "file index write".to_string(),
        })
    }
}

impl std::fmt::Debug for FileRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRepo")
            .field("dir", &self.dir)
            .field("skipped", &self.skipped.len())
            .finish_non_exhaustive()
    }
}

/// Writes the blob and header of one file directory, returning the bytes
/// copied.
fn write_entry(file_dir: &Path, header: &FileHeader, data: &mut dyn io::Read) -> Result<u64> {
    ensure_dir(file_dir)?;

    let content_path = file_dir.join(CONTENT_FILE_NAME);
    let tmp_path = content_path.with_extension("tmp");
    let mut out =
        fs::File::create(&tmp_path).map_err(|e| RepoError::io("creating", &tmp_path, e))?;
    let written =
        io::copy(data, &mut out).map_err(|e| RepoError::io("writing", &tmp_path, e))?;
    drop(out);

    write_json_atomic(&file_dir.join(HEADER_FILE_NAME), header)?;
    fs::rename(&tmp_path, &content_path)
        .map_err(|e| RepoError::io("renaming", &tmp_path, e))?;
    Ok(written)
}

/// Loads one file directory into a header with its location filled in.
fn load_header(file_dir: &Path) -> Result<FileHeader> {
    let mut header: FileHeader = read_json(&file_dir.join(HEADER_FILE_NAME))?;

    check_entry_name("header ID", header.id.as_str(), file_dir.file_name())?;

    let content_path = file_dir.join(CONTENT_FILE_NAME);
    if !content_path.is_file() {
        return Err(RepoError::Validation(format!(
            "content file {:?} is missing",
            content_path
        )));
    }

    header.location = content_path;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn test_file(id: &str, owner: &str, content: &[u8]) -> File {
        File::new(
            FileHeader {
                id: id.into(),
                name: format!("{id}.txt"),
                owner: owner.into(),
                created: t(1_000),
                size: content.len() as u64,
                ..Default::default()
            },
            Box::new(Cursor::new(content.to_vec())),
        )
    }

    fn create_test_repo(temp_dir: &TempDir) -> FileRepo {
        FileRepo::open(temp_dir.path().join("files"), &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_open_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        assert!(repo.dir().is_dir());
        assert!(repo.is_empty().unwrap());
        assert!(repo.skipped().is_empty());
    }

    #[test]
    fn test_open_rejects_regular_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("files");
        fs::write(&path, b"not a dir").unwrap();

        let result = FileRepo::open(&path, &CancellationToken::new());
        assert!(matches!(
            result,
            Err(RepoError::NotADirectory(_)) | Err(RepoError::Io { .. })
        ));
    }

    #[test]
    fn test_save_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        let file = test_file("file1", "user1", b"hello");
        let expected = file.header.clone();

        repo.save(file).unwrap();

        let got = repo.get(&"file1".into()).unwrap();
        assert_eq!(got.location, repo.dir().join("file1").join(CONTENT_FILE_NAME));
        assert_eq!(FileHeader { location: PathBuf::new(), ..got.clone() }, expected);

        let mut content = String::new();
        fs::File::open(&got.location)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_save_validation() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);

        let err = repo.save(test_file("", "user1", b"")).unwrap_err();
        assert_eq!(err.to_string(), "file ID cannot be empty");

        let err = repo.save(test_file("file1", "", b"")).unwrap_err();
        assert_eq!(err.to_string(), "file owner cannot be empty");

        assert!(matches!(
            repo.save(test_file("../escape", "user1", b"")),
            Err(RepoError::Validation(_))
        ));
        assert!(fs::read_dir(repo.dir()).unwrap().next().is_none());
    }

    #[test]
    fn test_save_failed_stream_is_not_indexed() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("stream broke"))
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        let mut file = test_file("file1", "user1", b"");
        file.data = Box::new(FailingReader);

        let err = repo.save(file).unwrap_err();
        assert!(matches!(err, RepoError::Io { op: "writing", .. }));
        assert!(matches!(
            repo.get(&"file1".into()),
            Err(RepoError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_save_failed_stream_stays_absent_after_reopen() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("stream broke"))
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        let mut file = test_file("file1", "user1", b"abc");
        file.data = Box::new(FailingReader);
        assert!(repo.save(file).is_err());
        assert!(!repo.dir().join("file1").exists());

        let reopened = create_test_repo(&temp_dir);
        assert!(reopened.is_empty().unwrap());
        assert!(matches!(
            reopened.get(&"file1".into()),
            Err(RepoError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_reopen_skips_header_without_published_blob() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        repo.save(test_file("file1", "user1", b"abc")).unwrap();

        // Interrupted between publishing the header and renaming the blob
        let file_dir = repo.dir().join("file1");
        fs::rename(
            file_dir.join(CONTENT_FILE_NAME),
            file_dir.join(CONTENT_FILE_NAME).with_extension("tmp"),
        )
        .unwrap();

        let reopened = create_test_repo(&temp_dir);
        assert!(reopened.is_empty().unwrap());
        assert_eq!(reopened.skipped().len(), 1);
    }

    #[test]
    fn test_save_same_id_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);

        repo.save(test_file("file1", "user1", b"one")).unwrap();
        let err = repo.save(test_file("file1", "user2", b"two")).unwrap_err();
        assert!(matches!(err, RepoError::DuplicateFileId(id) if id.as_str() == "file1"));

        let got = repo.get(&"file1".into()).unwrap();
        assert_eq!(got.owner.as_str(), "user1");
        assert!(repo.list_by_user(&"user2".into()).unwrap().is_empty());
        assert_eq!(fs::read(&got.location).unwrap(), b"one");

        let reopened = create_test_repo(&temp_dir);
        assert_eq!(reopened.get(&"file1".into()).unwrap().owner.as_str(), "user1");
    }

    #[test]
    fn test_header_on_disk_records_location() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        repo.save(test_file("file1", "user1", b"abc")).unwrap();

        let on_disk: FileHeader =
            read_json(&repo.dir().join("file1").join(HEADER_FILE_NAME)).unwrap();
        assert_eq!(on_disk.location, repo.dir().join("file1").join(CONTENT_FILE_NAME));
        assert!(!repo.dir().join("file1").join("file.tmp").exists());
    }

    #[test]
    fn test_get_missing() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        let err = repo.get(&"nope".into()).unwrap_err();
        assert!(matches!(err, RepoError::FileNotFound(id) if id.as_str() == "nope"));
    }

    #[test]
    fn test_list_by_user_is_isolated_and_ordered() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);

        let mut older = test_file("a-old", "user1", b"");
        older.header.created = t(10);
        repo.save(older).unwrap();
        repo.save(test_file("b-new", "user1", b"")).unwrap();
        repo.save(test_file("c-new", "user1", b"")).unwrap();
        repo.save(test_file("other", "user2", b"")).unwrap();

        let ids: Vec<String> = repo
            .list_by_user(&"user1".into())
            .unwrap()
            .into_iter()
            .map(|h| h.id.into_inner())
            .collect();
        assert_eq!(ids, vec!["b-new", "c-new", "a-old"]);
        assert!(repo.list_by_user(&"user3".into()).unwrap().is_empty());
    }

    #[test]
    fn test_delete_checks_every_owner_first() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        repo.save(test_file("mine", "user1", b"")).unwrap();
        repo.save(test_file("theirs", "user2", b"")).unwrap();

        let err = repo
            .delete(&"user1".into(), &["mine".into(), "theirs".into()])
            .unwrap_err();
        assert_eq!(err.to_string(), "file theirs not found to delete by user user1");
        assert!(repo.get(&"mine".into()).is_ok());
        assert!(repo.dir().join("mine").is_dir());
    }

    #[test]
    fn test_delete_removes_directory_and_index() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        repo.save(test_file("file1", "user1", b"x")).unwrap();
        repo.save(test_file("file2", "user1", b"y")).unwrap();

        repo.delete(&"user1".into(), &["file1".into(), "file1".into()])
            .unwrap();

        assert!(!repo.dir().join("file1").exists());
        assert!(repo.get(&"file1".into()).is_err());
        assert_eq!(repo.list_by_user(&"user1".into()).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_validation() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);

        let err = repo.delete(&UserId::default(), &[]).unwrap_err();
        assert_eq!(err.to_string(), "file owner ID cannot be empty");
        repo.delete(&"user1".into(), &[]).unwrap();
    }

    #[test]
    fn test_delete_expired_before_boundary() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);

        let mut at_cutoff = test_file("at", "user1", b"");
        at_cutoff.header.expires = Some(t(2_000));
        let mut later = test_file("later", "user1", b"");
        later.header.expires = Some(t(2_000) + TimeDelta::seconds(1));
        repo.save(at_cutoff).unwrap();
        repo.save(later).unwrap();
        repo.save(test_file("never", "user1", b"")).unwrap();

        assert_eq!(repo.delete_expired_before(t(1_999)).unwrap(), 0);
        assert_eq!(repo.delete_expired_before(t(2_000)).unwrap(), 1);
        assert!(repo.get(&"at".into()).is_err());
        assert!(!repo.dir().join("at").exists());
        assert!(repo.get(&"later".into()).is_ok());
        assert!(repo.get(&"never".into()).is_ok());
    }

    #[test]
    fn test_reopen_skips_corrupt_entries() {
        let temp_dir = TempDir::new().unwrap();
        {
            let repo = create_test_repo(&temp_dir);
            repo.save(test_file("good", "user1", b"ok")).unwrap();
            repo.save(test_file("headless", "user1", b"")).unwrap();
            repo.save(test_file("blobless", "user1", b"")).unwrap();
        }
        let root = temp_dir.path().join("files");
        fs::write(root.join("headless").join(HEADER_FILE_NAME), b"{garbage").unwrap();
        fs::remove_file(root.join("blobless").join(CONTENT_FILE_NAME)).unwrap();

        let repo = create_test_repo(&temp_dir);
        assert_eq!(repo.len().unwrap(), 1);
        assert!(repo.get(&"good".into()).is_ok());

        let skipped: Vec<PathBuf> = repo.skipped().iter().map(|s| s.path.clone()).collect();
        assert_eq!(skipped, vec![root.join("blobless"), root.join("headless")]);
    }

    #[test]
    fn test_open_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = FileRepo::open(temp_dir.path(), &cancel);
        assert!(matches!(result, Err(RepoError::Cancelled)));
    }
}
