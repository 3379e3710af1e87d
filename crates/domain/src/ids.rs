//! Opaque identifiers for files and users.

use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Random bytes behind a generated file ID.
pub const FILE_ID_LENGTH: usize = 64;

/// Random bytes behind a generated user ID.
pub const USER_ID_LENGTH: usize = 32;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the value is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Consumes the identifier, returning the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifies a stored file. Also the name of its on-disk directory.
    FileId
);

string_id!(
    /// Identifies a user account.
    UserId
);

string_id!(
    /// A user's login name.
    Username
);

/// Generates a fresh file ID from the operating system's random source.
pub fn generate_file_id() -> Result<FileId> {
    random_url_safe(FILE_ID_LENGTH).map(FileId)
}

/// Generates a fresh user ID from the operating system's random source.
pub fn generate_user_id() -> Result<UserId> {
    random_url_safe(USER_ID_LENGTH).map(UserId)
}

fn random_url_safe(length: usize) -> Result<String> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| DomainError::IdGeneration(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}
