//! Errors surfaced by the application service.

use std::error::Error as StdError;
use std::fmt;

use domain::{DomainError, DownloadError};
use thiserror::Error;

use crate::repo::RepoError;

/// Broad classification an outer layer maps to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller sent something invalid.
    BadRequest,
    /// Something failed that the caller cannot fix.
    Internal,
    /// Authentication failed.
    AuthnFailed,
    /// The caller is not allowed to do this.
    AuthzFailed,
    /// A store operation failed.
    Repo,
    /// The target does not exist.
    NotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BadRequest => "bad-request",
            Self::Internal => "internal",
            Self::AuthnFailed => "authn-failed",
            Self::AuthzFailed => "authz-failed",
            Self::Repo => "repo",
            Self::NotFound => "not-found",
        };
        f.write_str(name)
    }
}

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// An application failure: a kind, an optional user-facing detail and the
/// underlying error.
#[derive(Debug, Error)]
#[error("{kind}: {source}")]
pub struct AppError {
    kind: ErrorKind,
    detail: Option<String>,
    #[source]
    source: BoxError,
}

impl AppError {
    /// Wraps `source` as an error of `kind`.
    pub fn new(kind: ErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            detail: None,
            source: source.into(),
        }
    }

    /// A bad request with a message meant for the caller.
    pub fn user(detail: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            kind: ErrorKind::BadRequest,
            detail: Some(detail.into()),
            source: source.into(),
        }
    }

    /// Returns the classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the caller-facing detail, if one was attached.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the wrapped download refusal, if this is one.
    pub fn download_error(&self) -> Option<&DownloadError> {
        self.source.downcast_ref::<DownloadError>()
    }

    /// Returns the wrapped store error, if this is one.
    pub fn repo_error(&self) -> Option<&RepoError> {
        self.source.downcast_ref::<RepoError>()
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        let kind = match &err {
            RepoError::Validation(_) => ErrorKind::BadRequest,
            e if e.is_not_found() => ErrorKind::NotFound,
            _ => ErrorKind::Repo,
        };
        Self::new(kind, err)
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        let kind = match &err {
            DomainError::IdGeneration(_) | DomainError::Hasher(_) => ErrorKind::Internal,
            _ => ErrorKind::BadRequest,
        };
        Self::new(kind, err)
    }
}

/// Result type alias for application operations.
pub type Result<T> = std::result::Result<T, AppError>;
