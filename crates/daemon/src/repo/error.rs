//! Error types for the on-disk stores.

use std::path::PathBuf;

use domain::{FileId, UserId, Username};
use thiserror::Error;

/// Errors returned by the file, user and credential stores.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The store root exists but is not a directory.
    #[error("path {0} is not a directory")]
    NotADirectory(PathBuf),

    /// Index construction was cancelled before it finished.
    #[error("index build cancelled")]
    Cancelled,

    /// An argument failed validation. No I/O was attempted.
    #[error("{0}")]
    Validation(String),

    /// No file with this ID is indexed.
    #[error("file {0} not found")]
    FileNotFound(FileId),

    /// The file is not indexed under the requesting owner.
    #[error("file {file_id} not found to delete by user {owner}")]
    FileNotOwned {
        /// The requested file.
        file_id: FileId,
        /// The user who asked for the delete.
        owner: UserId,
    },

    /// A file with this ID is already stored.
    #[error("duplicate file ID {0} already exists")]
    DuplicateFileId(FileId),

    /// A multi-file delete stopped partway through.
    ///
    /// Earlier deletions remain applied.
    #[error(
        "successfully deleted the first {deleted} file(s) but failed deleting file {file_id}: {source}"
    )]
    PartialDelete {
        /// How many files were deleted before the failure.
        deleted: usize,
        /// The file whose deletion failed.
        file_id: FileId,
        /// Why it failed.
        #[source]
        source: Box<RepoError>,
    },

    /// No user with this ID is indexed.
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// A user with this ID already exists.
    #[error("duplicate user ID {0} already exists")]
    DuplicateUserId(UserId),

    /// The username is already registered to another user.
    #[error("username already exists: {0}")]
    DuplicateUsername(Username),

    /// No credentials are registered for the username or user.
    #[error("credential not found")]
    CredentialNotFound,

    /// A filesystem operation failed.
    #[error("{op} {path}: {source}")]
    Io {
        /// What was being attempted.
        op: &'static str,
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be encoded or decoded.
    #[error("{op} {path}: {source}")]
    Json {
        /// What was being attempted.
        op: &'static str,
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Lock poisoned during operation.
    #[error("lock poisoned: {context}")]
    LockPoisoned {
        /// Which lock was poisoned.
        context: String,
    },
}

impl RepoError {
    /// Builds an [`RepoError::Io`] for `op` on `path`.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Returns true for the not-found variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_)
                | Self::FileNotOwned { .. }
                | Self::UserNotFound(_)
                | Self::CredentialNotFound
        )
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, RepoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_delete_display() {
        let err = RepoError::PartialDelete {
            deleted: 1,
            file_id: "id2".into(),
            source: Box::new(RepoError::io(
                "removing",
                "/data/files/id2",
                std::io::Error::other("boom"),
            )),
        };
        assert_eq!(
            err.to_string(),
            "successfully deleted the first 1 file(s) but failed deleting file id2: removing /data/files/id2: boom"
        );
    }

    #[test]
    fn test_not_found_classification() {
        assert!(RepoError::FileNotFound("f".into()).is_not_found());
        assert!(RepoError::CredentialNotFound.is_not_found());
        assert!(!RepoError::Cancelled.is_not_found());
    }

    #[test]
    fn test_io_error_display_names_path() {
        let err = RepoError::io(
            "making directory",
            "/nope",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().starts_with("making directory /nope: "));
    }
}
