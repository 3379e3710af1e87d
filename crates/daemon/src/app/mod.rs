//! Application service.
//!
//! [`App`] ties the stores to the domain rules. It decides which failures the
//! caller sees and how they are classified, and it is the only place the
//! anti-enumeration concealment of download failures happens.

pub mod error;
pub mod files;
pub mod sweeper;
pub mod users;

use std::sync::Arc;

use anyhow::{Context, Result};
use domain::{
    generate_file_id, generate_user_id, parse_username, Clock, FileId, PasswordHasher, SystemClock,
    UserId, Username, DEFAULT_MIN_PASSWORD_LENGTH,
};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::hash::Argon2Hasher;
use crate::repo::{CredentialRepo, FileRepo, UserRepo};

pub use error::{AppError, ErrorKind};
pub use files::{conceal_lookup_failure, DownloadFailure, UploadArgs};
pub use sweeper::{ExpirySweeper, SweepReport};

/// Everything [`App`] needs.
pub struct AppConfig {
    /// File store.
    pub files: Arc<FileRepo>,
    /// User store.
    pub users: Arc<UserRepo>,
    /// Credential store.
    pub credentials: Arc<CredentialRepo>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Password hasher.
    pub hasher: Arc<dyn PasswordHasher>,
    /// Shortest accepted user password.
    pub min_password_length: usize,
    /// Username reserved for the administrator.
    pub admin_username: Option<Username>,
    /// File ID generator.
    pub generate_file_id: fn() -> domain::Result<FileId>,
    /// User ID generator.
    pub generate_user_id: fn() -> domain::Result<UserId>,
}

impl AppConfig {
    /// Builds a configuration around the given stores with the system clock,
    /// Argon2 hashing and random IDs.
    pub fn new(
        files: Arc<FileRepo>,
        users: Arc<UserRepo>,
        credentials: Arc<CredentialRepo>,
    ) -> Self {
        Self {
            files,
            users,
            credentials,
            clock: Arc::new(SystemClock),
            hasher: Arc::new(Argon2Hasher::new()),
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            admin_username: None,
            generate_file_id,
            generate_user_id,
        }
    }
}

/// The application service.
pub struct App {
    files: Arc<FileRepo>,
    users: Arc<UserRepo>,
    credentials: Arc<CredentialRepo>,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn PasswordHasher>,
    min_password_length: usize,
    admin_username: Option<Username>,
    generate_file_id: fn() -> domain::Result<FileId>,
    generate_user_id: fn() -> domain::Result<UserId>,
}

impl App {
    /// Creates the service.
    pub fn new(cfg: AppConfig) -> Self {
        Self {
            files: cfg.files,
            users: cfg.users,
            credentials: cfg.credentials,
            clock: cfg.clock,
            hasher: cfg.hasher,
            min_password_length: cfg.min_password_length,
            admin_username: cfg.admin_username,
            generate_file_id: cfg.generate_file_id,
            generate_user_id: cfg.generate_user_id,
        }
    }

    /// Opens every store named by `config` and builds the service on top.
    pub fn open(config: &Config, cancel: &CancellationToken) -> Result<Self> {
        let files = FileRepo::open(config.files_dir(), cancel)
            .with_context(|| format!("Failed to open file store at {:?}", config.files_dir()))?;
        let users = UserRepo::open(config.users_dir(), cancel)
            .with_context(|| format!("Failed to open user store at {:?}", config.users_dir()))?;
        let credentials = CredentialRepo::open(config.credentials_dir(), cancel).with_context(|| {
            format!(
                "Failed to open credential store at {:?}",
                config.credentials_dir()
            )
        })?;

        let admin_username = if config.security.admin_username.is_empty() {
            None
        } else {
            Some(
                parse_username(&config.security.admin_username)
                    .context("Invalid admin_username")?,
            )
        };

        let mut cfg = AppConfig::new(Arc::new(files), Arc::new(users), Arc::new(credentials));
        cfg.min_password_length = config.security.min_password_length;
        cfg.admin_username = admin_username;
        Ok(Self::new(cfg))
    }

    /// Returns a sweeper over this service's file store and clock.
    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(Arc::clone(&self.files), Arc::clone(&self.clock))
    }
}
