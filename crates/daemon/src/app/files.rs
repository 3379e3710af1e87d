//! File operations exposed by the application service.

use std::io::{ErrorKind as IoErrorKind, Read};

use chrono::{DateTime, Utc};
use domain::{upload_file, DownloadError, FileHeader, FileId, LongDuration, UploadFileArgs, UserId};

use super::error::{AppError, ErrorKind, Result};
use super::App;
use crate::repo::RepoError;

/// Inputs to [`App::upload_file`].
pub struct UploadArgs {
    /// Display name for the file.
    pub name: String,
    /// Uploading user.
    pub owner: UserId,
    /// Content stream.
    pub reader: Box<dyn Read + Send>,
    /// Content length in bytes.
    pub size: u64,
    /// Optional password. Empty means none.
    pub password: String,
    /// Expire this long after upload. Mutually exclusive with `expires`.
    pub expires_in: LongDuration,
    /// Expire at this instant. Mutually exclusive with `expires_in`.
    pub expires: Option<DateTime<Utc>>,
}

/// Why a download could not be served, before concealment.
#[derive(Debug)]
pub enum DownloadFailure {
    /// The store lookup failed.
    Lookup(RepoError),
    /// The domain rules refused the download.
    Denied(DownloadError),
}

/// Turns a download failure into the error the requester sees.
///
/// A missing or expired file is reported exactly as a password-protected
/// file would be, so requesters cannot probe which IDs exist. The real cause
/// is logged.
pub fn conceal_lookup_failure(password: &str, failure: DownloadFailure) -> AppError {
    let hidden = matches!(
        &failure,
        DownloadFailure::Lookup(RepoError::FileNotFound(_))
            | DownloadFailure::Denied(DownloadError::FileExpired)
    );

    if hidden {
        tracing::warn!(
            "mimicking a valid response for security, but real error was: {}",
            match &failure {
                DownloadFailure::Lookup(e) => e.to_string(),
                DownloadFailure::Denied(e) => e.to_string(),
            }
        );
        let shown = if password.is_empty() {
            DownloadError::PasswordRequired
        } else {
            DownloadError::PasswordInvalid
        };
        return AppError::new(ErrorKind::AuthzFailed, shown);
    }

    match failure {
        DownloadFailure::Lookup(e) => AppError::from(e),
        DownloadFailure::Denied(e @ DownloadError::Hasher(_)) => {
            AppError::new(ErrorKind::Internal, e)
        }
        DownloadFailure::Denied(e) => AppError::new(ErrorKind::AuthzFailed, e),
    }
}

impl App {
    /// Lists the files owned by `owner`, newest first.
    pub fn list_files(&self, owner: &UserId) -> Result<Vec<FileHeader>> {
        Ok(self.files.list_by_user(owner)?)
    }

    /// Validates and stores a new file, returning its ID.
    pub fn upload_file(&self, args: UploadArgs) -> Result<FileId> {
        let id = (self.generate_file_id)()
            .map_err(|e| AppError::new(ErrorKind::Internal, e))?;

        let mut expires = args.expires;
        if !args.expires_in.is_empty() {
            if expires.is_some() {
                return Err(AppError::new(
                    ErrorKind::BadRequest,
                    "cannot set both Expires In and Expires On fields",
                ));
            }
            expires = Some(args.expires_in.add_to(self.clock.now())?);
        }

        let file = upload_file(UploadFileArgs {
            id: id.clone(),
            name: args.name,
            owner: args.owner,
            reader: Some(args.reader),
            size: args.size,
            password: args.password,
            expires,
            clock: Some(self.clock.as_ref()),
            hasher: Some(self.hasher.as_ref()),
        })
        .map_err(|e| AppError::new(ErrorKind::BadRequest, e))?;

        self.files
            .save(file)
            .map_err(|e| AppError::new(ErrorKind::Repo, e))?;
        tracing::info!("Uploaded file {}", id);
        Ok(id)
    }

    /// Authorizes a download and opens the content.
    ///
    /// Unknown and expired files are reported as password failures.
    pub fn download_file(
        &self,
        requester: &UserId,
        id: &FileId,
        password: &str,
    ) -> Result<(FileHeader, std::fs::File)> {
        let header = self
            .files
            .get(id)
            .map_err(|e| conceal_lookup_failure(password, DownloadFailure::Lookup(e)))?;

        header
            .authorize_download(requester, password, self.hasher.as_ref(), self.clock.as_ref())
            .map_err(|e| conceal_lookup_failure(password, DownloadFailure::Denied(e)))?;

        let content = std::fs::File::open(&header.location).map_err(|e| {
            if e.kind() == IoErrorKind::NotFound {
                // Deleted between the lookup and the open
                conceal_lookup_failure(
                    password,
                    DownloadFailure::Lookup(RepoError::FileNotFound(id.clone())),
                )
            } else {
                AppError::new(
                    ErrorKind::Repo,
                    RepoError::io("opening", &header.location, e),
                )
            }
        })?;

        tracing::debug!("Serving file {} to {:?}", id, requester.as_str());
        Ok((header, content))
    }

    /// Deletes files owned by `owner`.
    pub fn delete_files(&self, owner: &UserId, ids: &[FileId]) -> Result<()> {
        Ok(self.files.delete(owner, ids)?)
    }

    /// Deletes every file whose expiration has been reached.
    pub fn delete_expired_files(&self) -> Result<usize> {
        Ok(self.files.delete_expired_before(self.clock.now())?)
    }
}
