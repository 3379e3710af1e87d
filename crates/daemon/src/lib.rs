//! # Blinkfile Daemon Library
//!
//! This crate provides the storage and service layer for Blinkfile, a
//! self-hosted store for sharing files through links that can expire or
//! require a password.
//!
//! ## Overview
//!
//! - **File Store**: Headers and content on disk, indexed by ID and by owner
//! - **User and Credential Stores**: Accounts and their Argon2 password hashes
//! - **Application Service**: Upload, download and delete rules, with
//!   unknown or expired files reported like password failures
//! - **Expiry Sweeper**: Background removal of expired files
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        App service                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌────────────┐   ┌────────────┐   ┌──────────────────┐    │
//! │  │  FileRepo  │   │  UserRepo  │   │  CredentialRepo  │    │
//! │  └────────────┘   └────────────┘   └──────────────────┘    │
//! │         ▲                                                   │
//! │  ┌──────┴─────────┐                                         │
//! │  │ ExpirySweeper  │                                         │
//! │  └────────────────┘                                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{App, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let cancel = CancellationToken::new();
//!
//!     let app = App::open(&config, &cancel)?;
//!     let sweeper = app.sweeper().spawn(config.sweeper.interval(), cancel.clone());
//!
//!     // Serve requests...
//!
//!     cancel.cancel();
//!     sweeper.await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`repo`]: Filesystem-backed stores and their in-memory indices
//! - [`app`]: Application service and expiry sweeper
//! - [`hash`]: Argon2 password hashing

pub mod app;
pub mod config;
pub mod hash;
pub mod repo;

// Re-export domain for convenience
pub use domain;

// Re-export config types for convenience
pub use config::Config;

// Re-export service types for convenience
pub use app::{App, AppConfig, AppError, ErrorKind, ExpirySweeper, SweepReport};

// Re-export store types for convenience
pub use repo::{CredentialRepo, FileRepo, RepoError, UserRepo};

pub use hash::Argon2Hasher;
