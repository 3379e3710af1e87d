//! On-disk stores for files, users and credentials.
//!
//! Every store owns one root directory and an in-memory index rebuilt from
//! that directory when the store opens. There is no separate journal: the
//! directory walk in [`index`] is the only recovery mechanism.

pub mod credential;
pub mod error;
mod fs;
pub mod file;
pub mod index;
pub mod user;

pub use credential::CredentialRepo;
pub use error::{RepoError, Result};
pub use file::{FileRepo, CONTENT_FILE_NAME, HEADER_FILE_NAME};
pub use index::{EntryKind, SkippedEntry};
pub use user::UserRepo;
