//! Error types for the domain crate.

use thiserror::Error;

use crate::services::HashError;

/// Validation and construction failures raised by domain rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    // File upload validation
    /// The file identifier was empty.
    #[error("file ID cannot be empty")]
    EmptyFileId,

    /// The display name was empty.
    #[error("file name cannot be empty")]
    EmptyFileName,

    /// The owning user was empty.
    #[error("file owner cannot be empty")]
    EmptyOwner,

    /// No content stream was supplied.
    #[error("file reader cannot be empty")]
    MissingReader,

    /// No clock service was supplied.
    #[error("clock service cannot be empty")]
    MissingClock,

    /// A password was supplied without a hasher to protect it.
    #[error("a password is set, so a password hasher cannot be empty")]
    MissingHasher,

    /// The requested expiration is not strictly after the current time.
    #[error("expiration cannot be set in the past")]
    ExpirationInPast,

    // User validation
    /// The user identifier was empty.
    #[error("user ID cannot be empty")]
    EmptyUserId,

    /// The username was empty after trimming.
    #[error("user name cannot be empty")]
    EmptyUsername,

    /// The username is shorter than the allowed minimum.
    #[error("user name must be at least {min} characters long")]
    UsernameTooShort {
        /// Minimum accepted length.
        min: usize,
    },

    /// A rename was requested to the current username.
    #[error("previous and new usernames cannot be the same")]
    SameUsername,

    /// The password is shorter than the allowed minimum.
    #[error("password must be at least {min} characters long")]
    PasswordTooShort {
        /// Minimum accepted length.
        min: usize,
    },

    // Parsing
    /// A long-duration string could not be parsed.
    #[error("invalid long duration amount {input:?}: {detail}")]
    InvalidLongDuration {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        detail: String,
    },

    // Services
    /// The random source failed while generating an identifier.
    #[error("generating identifier: {0}")]
    IdGeneration(String),

    /// The password hasher failed.
    #[error(transparent)]
    Hasher(#[from] HashError),
}

/// Reasons a download request is refused.
///
/// These are precise internally. The service boundary merges not-found and
/// expired lookups into the password variants before a requester sees them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// The file expiration has been reached.
    #[error("file has expired")]
    FileExpired,

    /// The file is password protected and no password was given.
    #[error("file access requires password")]
    PasswordRequired,

    /// The given password does not match.
    #[error("invalid file password")]
    PasswordInvalid,

    /// The password hasher failed while checking the password.
    #[error(transparent)]
    Hasher(#[from] HashError),
}

/// Result type alias for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
