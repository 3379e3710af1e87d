//! Filesystem-backed user store, one JSON document per user.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use domain::{User, UserId, Username};
use tokio_util::sync::CancellationToken;

use super::error::{RepoError, Result};
use super::fs::{
    check_entry_name, ensure_dir, read_json, remove_file, validate_component, write_json_atomic,
};
use super::index::{self, EntryKind, SkippedEntry};

#[derive(Debug, Default)]
struct UserIndex {
    by_id: HashMap<UserId, User>,
    by_username: HashMap<Username, UserId>,
}

impl UserIndex {
    fn insert(&mut self, user: User) {
        if let Some(previous) = self.by_id.remove(&user.id) {
            self.by_username.remove(&previous.username);
        }
        self.by_username.insert(user.username.clone(), user.id.clone());
        self.by_id.insert(user.id.clone(), user);
    }

    fn remove(&mut self, id: &UserId) -> Option<User> {
        let user = self.by_id.remove(id)?;
        self.by_username.remove(&user.username);
        Some(user)
    }

    fn username_taken_by_other(&self, username: &Username, id: &UserId) -> bool {
        self.by_username
            .get(username)
            .is_some_and(|owner| owner != id)
    }
}

/// Thread-safe store for user accounts.
pub struct UserRepo {
    dir: PathBuf,
    index: RwLock<UserIndex>,
    skipped: Vec<SkippedEntry>,
}

impl UserRepo {
    /// Opens the store rooted at `dir` and rebuilds its index.
    pub fn open(dir: impl AsRef<Path>, cancel: &CancellationToken) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_dir(&dir)?;

        let mut repo = Self {
            dir,
            index: RwLock::new(UserIndex::default()),
            skipped: Vec::new(),
        };
        let skipped = {
            let mut index = repo.write_index()?;
            index::build(
                &repo.dir,
                EntryKind::Files,
                cancel,
                load_user,
                |user| index.insert(user),
            )?
        };
        repo.skipped = skipped;

        tracing::info!(
            "Loaded {} users from {:?} ({} skipped)",
            repo.read_index()?.by_id.len(),
            repo.dir,
            repo.skipped.len()
        );
        Ok(repo)
    }

    /// Returns the store root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the entries that could not be loaded when the store opened.
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Persists a new user. Both the ID and the username must be unused.
    pub fn create(&self, user: &User) -> Result<()> {
        validate_user(user)?;
        let mut index = self.write_index()?;
        if index.by_id.contains_key(&user.id) {
            return Err(RepoError::DuplicateUserId(user.id.clone()));
        }
        if index.by_username.contains_key(&user.username) {
            return Err(RepoError::DuplicateUsername(user.username.clone()));
        }

        write_json_atomic(&self.path_for(&user.id), user)?;
        index.insert(user.clone());
        tracing::info!("Created user {} ({})", user.id, user.username);
        Ok(())
    }

    /// Replaces an existing user.
    pub fn update(&self, user: &User) -> Result<()> {
        validate_user(user)?;
        let mut index = self.write_index()?;
        if !index.by_id.contains_key(&user.id) {
            return Err(RepoError::UserNotFound(user.id.clone()));
        }
        if index.username_taken_by_other(&user.username, &user.id) {
            return Err(RepoError::DuplicateUsername(user.username.clone()));
        }

        write_json_atomic(&self.path_for(&user.id), user)?;
        index.insert(user.clone());
        tracing::debug!("Updated user {}", user.id);
        Ok(())
    }

    /// Returns the user with `id`.
    pub fn get(&self, id: &UserId) -> Result<User> {
        if id.is_empty() {
            return Err(RepoError::Validation("user ID cannot be empty".to_string()));
        }
        self.read_index()?
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| RepoError::UserNotFound(id.clone()))
    }

    /// Returns the user registered under `username`, if any.
    pub fn find_by_username(&self, username: &Username) -> Result<Option<User>> {
        let index = self.read_index()?;
        Ok(index
            .by_username
            .get(username)
            .and_then(|id| index.by_id.get(id))
            .cloned())
    }

    /// Returns every user, sorted by username.
    pub fn list_all(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.read_index()?.by_id.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    /// Removes the user with `id`.
    pub fn delete(&self, id: &UserId) -> Result<()> {
        validate_component("user ID", id.as_str())?;
        let mut index = self.write_index()?;
        if !index.by_id.contains_key(id) {
            return Err(RepoError::UserNotFound(id.clone()));
        }
        remove_file(&self.path_for(id))?;
        index.remove(id);
        tracing::info!("Deleted user {}", id);
        Ok(())
    }

    fn path_for(&self, id: &UserId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn read_index(&self) -> Result<RwLockReadGuard<'_, UserIndex>> {
        self.index.read().map_err(|_| RepoError::LockPoisoned {
            context: "user index read".to_string(),
        })
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, UserIndex>> {
        self.index.write().map_err(|_| RepoError::LockPoisoned {
            context: "user index write".to_string(),
        })
    }
}

/// Loads `<id>.json`, rejecting a record stored under another ID.
fn load_user(path: &Path) -> Result<User> {
    let user: User = read_json(path)?;
    check_entry_name("user ID", user.id.as_str(), path.file_stem())?;
    Ok(user)
}

fn validate_user(user: &User) -> Result<()> {
    validate_component("user ID", user.id.as_str())?;
    if user.username.is_empty() {
        return Err(RepoError::Validation("username cannot be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn test_user(id: &str, username: &str) -> User {
        User {
            id: id.into(),
            username: username.into(),
            created: Utc.timestamp_opt(100, 0).unwrap(),
            last_edited: None,
        }
    }

    fn create_test_repo(temp_dir: &TempDir) -> UserRepo {
        UserRepo::open(temp_dir.path().join("users"), &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        let user = test_user("u1", "alice");

        repo.create(&user).unwrap();

        assert_eq!(repo.get(&"u1".into()).unwrap(), user);
        assert_eq!(repo.find_by_username(&"alice".into()).unwrap(), Some(user));
        assert!(repo.dir().join("u1.json").is_file());
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        repo.create(&test_user("u1", "alice")).unwrap();

        assert!(matches!(
            repo.create(&test_user("u1", "bobby")),
            Err(RepoError::DuplicateUserId(_))
        ));
        assert!(matches!(
            repo.create(&test_user("u2", "alice")),
            Err(RepoError::DuplicateUsername(_))
        ));
    }

    #[test]
    fn test_update_renames() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        repo.create(&test_user("u1", "alice")).unwrap();
        repo.create(&test_user("u2", "bobby")).unwrap();

        assert!(matches!(
            repo.update(&test_user("u1", "bobby")),
            Err(RepoError::DuplicateUsername(_))
        ));
        assert!(matches!(
            repo.update(&test_user("u9", "carol")),
            Err(RepoError::UserNotFound(_))
        ));

        repo.update(&test_user("u1", "alicia")).unwrap();
        assert!(repo.find_by_username(&"alice".into()).unwrap().is_none());
        assert_eq!(
            repo.find_by_username(&"alicia".into()).unwrap().unwrap().id.as_str(),
            "u1"
        );
    }

    #[test]
    fn test_list_all_sorted_by_username() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        repo.create(&test_user("u1", "zed-user")).unwrap();
        repo.create(&test_user("u2", "abby")).unwrap();

        let names: Vec<String> = repo
            .list_all()
            .unwrap()
            .into_iter()
            .map(|u| u.username.into_inner())
            .collect();
        assert_eq!(names, vec!["abby", "zed-user"]);
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let repo = create_test_repo(&temp_dir);
        repo.create(&test_user("u1", "alice")).unwrap();

        repo.delete(&"u1".into()).unwrap();
        assert!(matches!(repo.get(&"u1".into()), Err(RepoError::UserNotFound(_))));
        assert!(!repo.dir().join("u1.json").exists());
        assert!(matches!(
            repo.delete(&"u1".into()),
            Err(RepoError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_reopen_rebuilds_index() {
        let temp_dir = TempDir::new().unwrap();
        {
            let repo = create_test_repo(&temp_dir);
            repo.create(&test_user("u1", "alice")).unwrap();
            repo.create(&test_user("u2", "bobby")).unwrap();
        }
        let root = temp_dir.path().join("users");
        std::fs::write(root.join("u3.json"), b"[]").unwrap();
        // A record copied under another ID's file name
        std::fs::copy(root.join("u1.json"), root.join("u9.json")).unwrap();

        let repo = create_test_repo(&temp_dir);
        assert_eq!(repo.list_all().unwrap().len(), 2);
        assert_eq!(repo.skipped().len(), 2);
        assert_eq!(repo.skipped()[1].path, root.join("u9.json"));
        assert!(matches!(
            repo.get(&"u9".into()),
            Err(RepoError::UserNotFound(_))
        ));
        assert!(repo.find_by_username(&"bobby".into()).unwrap().is_some());
    }
}
