//! Stored files and the rules around uploading and downloading them.

use std::cmp::Ordering;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DownloadError, Result};
use crate::ids::{FileId, UserId};
use crate::services::{Clock, PasswordHasher};

/// Metadata describing a stored file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Unique file identifier.
    pub id: FileId,
    /// Display name shown to users. Not a filesystem path.
    pub name: String,
    /// Where the content lives on disk. The store recomputes it from the id
    /// when it loads a header.
    #[serde(default)]
    pub location: PathBuf,
    /// The uploading user.
    pub owner: UserId,
    /// Upload time.
    pub created: DateTime<Utc>,
    /// When the file stops being downloadable. `None` means never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    /// Content length in bytes.
    pub size: u64,
    /// Encoded password hash. Empty when the file has no password.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password_hash: String,
}

impl FileHeader {
    /// Returns true once `now` has reached the expiration.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| now >= expires)
    }

    /// Returns true if downloading requires a password from non-owners.
    pub fn has_password(&self) -> bool {
        !self.password_hash.is_empty()
    }

    /// Decides whether `requester` may download this file.
    ///
    /// Checks run in a fixed order: expiration first (it applies to the owner
    /// too), then the owner bypass, then the password.
    pub fn authorize_download(
        &self,
        requester: &UserId,
        password: &str,
        hasher: &dyn PasswordHasher,
        clock: &dyn Clock,
    ) -> std::result::Result<(), DownloadError> {
        if self.is_expired_at(clock.now()) {
            return Err(DownloadError::FileExpired);
        }
        if !requester.is_empty() && *requester == self.owner {
            return Ok(());
        }
        if self.password_hash.is_empty() {
            return Ok(());
        }
        if password.is_empty() {
            return Err(DownloadError::PasswordRequired);
        }
        if hasher.verify(&self.password_hash, password.as_bytes())? {
            Ok(())
        } else {
            Err(DownloadError::PasswordInvalid)
        }
    }
}

/// A header paired with its content stream.
///
/// The stream can only be read once; handing the `File` to a store consumes it.
pub struct File {
    /// The file metadata.
    pub header: FileHeader,
    /// The file content.
    pub data: Box<dyn Read + Send>,
}

impl File {
    /// Pairs a header with its content.
    pub fn new(header: FileHeader, data: Box<dyn Read + Send>) -> Self {
        Self { header, data }
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// Inputs to [`upload_file`].
///
/// Collaborators are optional so a missing one is reported as a validation
/// error instead of being impossible to express.
#[derive(Default)]
pub struct UploadFileArgs<'a> {
    /// Identifier for the new file.
    pub id: FileId,
    /// Display name.
    pub name: String,
    /// Uploading user.
    pub owner: UserId,
    /// Content stream.
    pub reader: Option<Box<dyn Read + Send>>,
    /// Content length in bytes.
    pub size: u64,
    /// Optional password. Empty means none.
    pub password: String,
    /// Optional expiration. Must be in the future.
    pub expires: Option<DateTime<Utc>>,
    /// Time source.
    pub clock: Option<&'a dyn Clock>,
    /// Required when `password` is set.
    pub hasher: Option<&'a dyn PasswordHasher>,
}

/// Validates an upload and builds the [`File`] to store.
pub fn upload_file(args: UploadFileArgs<'_>) -> Result<File> {
    if args.id.is_empty() {
        return Err(DomainError::EmptyFileId);
    }
    if args.name.is_empty() {
        return Err(DomainError::EmptyFileName);
    }
    if args.owner.is_empty() {
        return Err(DomainError::EmptyOwner);
    }
    let reader = args.reader.ok_or(DomainError::MissingReader)?;
    let clock = args.clock.ok_or(DomainError::MissingClock)?;

    let password_hash = if args.password.is_empty() {
        String::new()
    } else {
        let hasher = args.hasher.ok_or(DomainError::MissingHasher)?;
        hasher.hash(args.password.as_bytes())?
    };

    let now = clock.now();
    if let Some(expires) = args.expires {
        if expires <= now {
            return Err(DomainError::ExpirationInPast);
        }
    }

    let header = FileHeader {
        id: args.id,
        name: args.name,
        location: PathBuf::new(),
        owner: args.owner,
        created: now,
        expires: args.expires,
        size: args.size,
        password_hash,
    };
    Ok(File::new(header, reader))
}

/// Listing order: newest first, then by name, then by id.
pub fn listing_order(a: &FileHeader, b: &FileHeader) -> Ordering {
    b.created
        .cmp(&a.created)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts headers in place using [`listing_order`].
pub fn sort_for_listing(headers: &mut [FileHeader]) {
    headers.sort_by(listing_order);
}
