//! Filesystem-backed credential store, one JSON document per username.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use domain::{Credentials, UserId, Username};
use tokio_util::sync::CancellationToken;

use super::error::{RepoError, Result};
use super::fs::{
    check_entry_name, ensure_dir, read_json, remove_file, validate_component, write_json_atomic,
};
use super::index::{self, EntryKind, SkippedEntry};

/// Thread-safe store for login credentials.
pub struct CredentialRepo {
    dir: PathBuf,
    by_username: RwLock<HashMap<Username, Credentials>>,
    skipped: Vec<SkippedEntry>,
}

impl CredentialRepo {
    /// Opens the store rooted at `dir` and rebuilds its index.
    pub fn open(dir: impl AsRef<Path>, cancel: &CancellationToken) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_dir(&dir)?;

        let mut repo = Self {
            dir,
            by_username: RwLock::new(HashMap::new()),
            skipped: Vec::new(),
        };
        let skipped = {
            let mut index = repo.write_index()?;
            index::build(
                &repo.dir,
                EntryKind::Files,
                cancel,
                load_credentials,
                |creds| {
                    index.insert(creds.username.clone(), creds);
                },
            )?
        };
        repo.skipped = skipped;

        tracing::info!(
            "Loaded {} credentials from {:?} ({} skipped)",
            repo.read_index()?.len(),
            repo.dir,
            repo.skipped.len()
        );
        Ok(repo)
    }

    /// Returns the entries that could not be loaded when the store opened.
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Stores `creds`, replacing any previous credentials for the same
    /// username and user.
    pub fn set(&self, creds: &Credentials) -> Result<()> {
        validate_credentials(creds)?;
        let mut index = self.write_index()?;
        if index
            .get(&creds.username)
            .is_some_and(|existing| existing.user_id != creds.user_id)
        {
            return Err(RepoError::DuplicateUsername(creds.username.clone()));
        }

        write_json_atomic(&self.path_for(&creds.username), creds)?;
        index.insert(creds.username.clone(), creds.clone());
        tracing::debug!("Stored credentials for {}", creds.username);
        Ok(())
    }

    /// Returns the credentials registered under `username`.
    pub fn get(&self, username: &Username) -> Result<Credentials> {
        if username.is_empty() {
            return Err(RepoError::Validation("username cannot be empty".to_string()));
        }
        self.read_index()?
            .get(username)
            .cloned()
            .ok_or(RepoError::CredentialNotFound)
    }

    /// Moves a user's credentials from `previous` to `username`.
    pub fn update_username(
        &self,
        user_id: &UserId,
        previous: &Username,
        username: &Username,
    ) -> Result<()> {
        validate_component("username", username.as_str())?;
        let mut index = self.write_index()?;
        let existing = index
            .get(previous)
            .filter(|c| c.user_id == *user_id)
            .cloned()
            .ok_or(RepoError::CredentialNotFound)?;
        if index.contains_key(username) {
            return Err(RepoError::DuplicateUsername(username.clone()));
        }

        let moved = Credentials {
            username: username.clone(),
            ..existing
        };
        write_json_atomic(&self.path_for(username), &moved)?;
        index.insert(username.clone(), moved);

        remove_file(&self.path_for(previous))?;
        index.remove(previous);
        tracing::debug!("Renamed credentials {} to {}", previous, username);
        Ok(())
    }

    /// Removes every credential registered for `user_id`.
    pub fn remove(&self, user_id: &UserId) -> Result<()> {
        if user_id.is_empty() {
            return Err(RepoError::Validation("user ID cannot be empty".to_string()));
        }
        let mut index = self.write_index()?;
        let mut usernames: Vec<Username> = index
            .values()
            .filter(|c| c.user_id == *user_id)
            .map(|c| c.username.clone())
            .collect();
        if usernames.is_empty() {
            return Err(RepoError::CredentialNotFound);
        }
        usernames.sort();

        for username in &usernames {
            remove_file(&self.path_for(username))?;
            index.remove(username);
        }
        tracing::debug!("Removed {} credentials for user {}", usernames.len(), user_id);
        Ok(())
    }

    fn path_for(&self, username: &Username) -> PathBuf {
        self.dir.join(format!("{}.json", username))
    }

    fn read_index(&self) -> Result<RwLockReadGuard<'_, HashMap<Username, Credentials>>> {
        self.by_username.read().map_err(|_| RepoError::LockPoisoned {
            context: "credential index read".to_string(),
        })
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, HashMap<Username, Credentials>>> {
        self.by_username.write().map_err(|_| RepoError::LockPoisoned {
            context: "credential index write".to_string(),
        })
    }
}

fn validate_credentials(creds: &Credentials) -> Result<()> {
    if creds.user_id.is_empty() {
        return Err(RepoError::Validation("user ID cannot be empty".to_string()));
    }
    validate_component("username", creds.username.as_str())
}

/// Loads `<username>.json`, rejecting a record stored under another name.
fn load_credentials(path: &Path) -> Result<Credentials> {
    let creds: Credentials = read_json(path)?;
    check_entry_name("username", creds.username.as_str(), path.file_stem())?;
    Ok(creds)
}
