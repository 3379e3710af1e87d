//! User accounts and their password credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::ids::{UserId, Username};
use crate::services::{Clock, HashError, PasswordHasher};

/// Shortest accepted username, counted after trimming.
pub const MIN_USERNAME_LENGTH: usize = 4;

/// Default shortest accepted password.
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 16;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: UserId,
    /// Login name.
    pub username: Username,
    /// Registration time.
    pub created: DateTime<Utc>,
    /// Last time the account was changed, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited: Option<DateTime<Utc>>,
}

/// Builds a new user, normalizing the username.
pub fn create_user(id: UserId, username: &str, clock: &dyn Clock) -> Result<User> {
    if id.is_empty() {
        return Err(DomainError::EmptyUserId);
    }
    let username = parse_username(username)?;
    Ok(User {
        id,
        username,
        created: clock.now(),
        last_edited: None,
    })
}

impl User {
    /// Returns a copy of this user renamed to `username`.
    pub fn change_username(&self, username: &str, clock: &dyn Clock) -> Result<User> {
        let username = parse_username(username)?;
        if username == self.username {
            return Err(DomainError::SameUsername);
        }
        Ok(User {
            username,
            last_edited: Some(clock.now()),
            ..self.clone()
        })
    }
}

/// Trims spaces and enforces the minimum length.
pub fn parse_username(raw: &str) -> Result<Username> {
    let trimmed = raw.trim_matches(' ');
    if trimmed.is_empty() {
        return Err(DomainError::EmptyUsername);
    }
    if trimmed.chars().count() < MIN_USERNAME_LENGTH {
        return Err(DomainError::UsernameTooShort {
            min: MIN_USERNAME_LENGTH,
        });
    }
    Ok(Username::from(trimmed))
}

/// A username bound to a password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The account these credentials log in to.
    pub user_id: UserId,
    /// Login name.
    pub username: Username,
    /// Encoded password hash.
    pub password_hash: String,
}

impl Credentials {
    /// Hashes `password` into new credentials.
    ///
    /// Passwords shorter than `min_password_length` characters are rejected
    /// before hashing.
    pub fn with_password(
        user_id: UserId,
        username: Username,
        password: &str,
        min_password_length: usize,
        hasher: &dyn PasswordHasher,
    ) -> Result<Self> {
        if user_id.is_empty() {
            return Err(DomainError::EmptyUserId);
        }
        if username.is_empty() {
            return Err(DomainError::EmptyUsername);
        }
        if password.chars().count() < min_password_length {
            return Err(DomainError::PasswordTooShort {
                min: min_password_length,
            });
        }
        let password_hash = hasher.hash(password.as_bytes())?;
        Ok(Self {
            user_id,
            username,
            password_hash,
        })
    }

    /// Returns true if `username` and `password` both match.
    pub fn matches(
        &self,
        username: &Username,
        password: &str,
        hasher: &dyn PasswordHasher,
    ) -> std::result::Result<bool, HashError> {
        if *username != self.username {
            return Ok(false);
        }
        hasher.verify(&self.password_hash, password.as_bytes())
    }
}
