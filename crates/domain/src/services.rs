//! Collaborator services consumed by the domain rules.
//!
//! The rules never read the system clock or hash passwords directly. Callers
//! hand in a [`Clock`] and a [`PasswordHasher`], which keeps the rules
//! deterministic under test.

use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Used by tests and by deterministic test-automation runs.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Failures reported by a [`PasswordHasher`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    /// The stored hash could not be decoded.
    #[error("malformed password hash: {0}")]
    MalformedHash(String),

    /// Producing a new hash failed.
    #[error("hashing failed: {0}")]
    Hashing(String),
}

/// One-way password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hashes `password` into a self-describing encoded string.
    fn hash(&self, password: &[u8]) -> Result<String, HashError>;

    /// Checks `password` against a hash produced by [`PasswordHasher::hash`].
    ///
    /// A mismatch is `Ok(false)`. An undecodable hash is an error.
    fn verify(&self, hash: &str, password: &[u8]) -> Result<bool, HashError>;
}
