//! User management and authentication.

use domain::{create_user, parse_username, Credentials, DomainError, User, UserId, Username};

use super::error::{AppError, ErrorKind, Result};
use super::App;
use crate::repo::RepoError;

impl App {
    /// Registers a user and their password, returning the new user ID.
    ///
    /// If storing the credentials fails the user record is removed again.
    pub fn create_user(&self, username: &str, password: &str) -> Result<UserId> {
        self.ensure_not_reserved(username)?;

        let id = (self.generate_user_id)()
            .map_err(|e| AppError::new(ErrorKind::Internal, e))?;
        let user = create_user(id, username, self.clock.as_ref()).map_err(username_error)?;

        self.users.create(&user).map_err(|e| match e {
            RepoError::DuplicateUsername(_) => AppError::user(
                format!("Username {:?} already exists.", user.username.as_str()),
                e,
            ),
            e => AppError::new(ErrorKind::Repo, e),
        })?;

        if let Err(e) = self.register_credentials(&user.id, &user.username, password) {
            if let Err(cleanup) = self.users.delete(&user.id) {
                tracing::error!(
                    "deleting user after failure to register credentials: {}",
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::info!("Created user {} ({})", user.id, user.username);
        Ok(user.id)
    }

    /// Renames a user, keeping their credentials in step.
    pub fn change_username(&self, id: &UserId, username: &str) -> Result<()> {
        self.ensure_not_reserved(username)?;

        let user = self.get_user(id)?;
        let renamed = user
            .change_username(username, self.clock.as_ref())
            .map_err(username_error)?;

        self.users.update(&renamed).map_err(|e| match e {
            RepoError::DuplicateUsername(_) => AppError::user(
                format!("Username {:?} already exists.", renamed.username.as_str()),
                e,
            ),
            e => AppError::new(ErrorKind::Repo, e),
        })?;

        if let Err(e) = self
            .credentials
            .update_username(&user.id, &user.username, &renamed.username)
        {
            if let Err(revert) = self.users.update(&user) {
                tracing::error!(
                    "reverting user after failure to update username credential: {}",
                    revert
                );
            }
            return Err(AppError::new(ErrorKind::Repo, e));
        }
        Ok(())
    }

    /// Replaces a user's password, returning their username.
    pub fn change_password(&self, id: &UserId, password: &str) -> Result<Username> {
        let user = self.get_user(id)?;
        self.register_credentials(&user.id, &user.username, password)?;
        tracing::info!("Changed password for user {}", user.id);
        Ok(user.username)
    }

    /// Lists every user, sorted by username.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.users
            .list_all()
            .map_err(|e| AppError::new(ErrorKind::Repo, e))
    }

    /// Returns the user with `id`.
    pub fn get_user(&self, id: &UserId) -> Result<User> {
        self.users.get(id).map_err(|e| match e {
            RepoError::UserNotFound(_) => AppError::new(ErrorKind::NotFound, e),
            e => AppError::from(e),
        })
    }

    /// Deletes users together with their files and credentials.
    pub fn delete_users(&self, ids: &[UserId]) -> Result<()> {
        for id in ids {
            let owned: Vec<_> = self
                .list_files(id)?
                .into_iter()
                .map(|header| header.id)
                .collect();
            self.delete_files(id, &owned)?;
            tracing::info!("deleted {} files for user ID {}", owned.len(), id);

            match self.credentials.remove(id) {
                Ok(()) => {}
                Err(RepoError::CredentialNotFound) => {
                    tracing::warn!("user ID {} had no credentials to remove", id);
                }
                Err(e) => return Err(AppError::new(ErrorKind::Repo, e)),
            }
            self.users.delete(id)?;
            tracing::info!("deleted user ID {} and their credentials", id);
        }
        Ok(())
    }

    /// Checks a username and password, returning the user they belong to.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<UserId> {
        if username.is_empty() {
            return Err(AppError::new(
                ErrorKind::AuthnFailed,
                "invalid credentials: username cannot be empty",
            ));
        }
        if password.is_empty() {
            return Err(AppError::new(
                ErrorKind::AuthnFailed,
                "invalid credentials: password cannot be empty",
            ));
        }

        let username = Username::from(username);
        let creds = match self.credentials.get(&username) {
            Ok(creds) => creds,
            Err(RepoError::CredentialNotFound) => {
                return Err(AppError::new(
                    ErrorKind::AuthnFailed,
                    format!("invalid credentials: no user {:?}", username.as_str()),
                ))
            }
            Err(e) => return Err(AppError::new(ErrorKind::Internal, e)),
        };

        let matched = creds
            .matches(&username, password, self.hasher.as_ref())
            .map_err(|e| AppError::new(ErrorKind::Internal, e))?;
        if !matched {
            return Err(AppError::new(
                ErrorKind::AuthnFailed,
                format!("invalid credentials for {:?}", username.as_str()),
            ));
        }

        tracing::debug!("Authenticated {}", username);
        Ok(creds.user_id)
    }

    fn register_credentials(&self, id: &UserId, username: &Username, password: &str) -> Result<()> {
        let creds = Credentials::with_password(
            id.clone(),
            username.clone(),
            password,
            self.min_password_length,
            self.hasher.as_ref(),
        )
        .map_err(|e| match e {
            DomainError::Hasher(_) => AppError::new(ErrorKind::Internal, e),
            e => AppError::user(format!("Credential error: {e}"), e),
        })?;
        self.credentials.set(&creds).map_err(|e| match e {
            RepoError::Validation(_) | RepoError::DuplicateUsername(_) => {
                AppError::user(format!("Credential error: {e}"), e)
            }
            e => AppError::new(ErrorKind::Repo, e),
        })
    }

    fn ensure_not_reserved(&self, username: &str) -> Result<()> {
        let Some(admin) = &self.admin_username else {
            return Ok(());
        };
        let Ok(parsed) = parse_username(username) else {
            return Ok(());
        };
        if parsed == *admin {
            return Err(AppError::user(
                format!("Username {:?} is reserved and cannot be used.", parsed.as_str()),
                format!(
                    "attempted to use the same username as the system admin {:?}",
                    parsed.as_str()
                ),
            ));
        }
        Ok(())
    }
}

fn username_error(err: DomainError) -> AppError {
    let detail = match &err {
        DomainError::EmptyUsername => "Username cannot be empty.".to_string(),
        DomainError::UsernameTooShort { min } => {
            format!("Username must be at least {min} characters.")
        }
        DomainError::SameUsername => "Previous and new usernames cannot be the same.".to_string(),
        _ => return AppError::from(err),
    };
    AppError::user(detail, err)
}
