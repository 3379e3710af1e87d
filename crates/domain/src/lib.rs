//! # Blinkfile Domain Library
//!
//! This crate holds the types and rules for Blinkfile, a small service for
//! sharing files through links that can be password protected and set to
//! expire.
//!
//! ## Overview
//!
//! The domain crate performs no I/O. It provides:
//!
//! - **Identifiers**: [`FileId`], [`UserId`] and [`Username`] plus random ID generation
//! - **Files**: [`FileHeader`], upload validation and download authorization
//! - **Users**: [`User`] and password [`Credentials`]
//! - **Services**: the [`Clock`] and [`PasswordHasher`] collaborators the rules call into
//! - **Durations**: [`LongDuration`] for expirations given in days or weeks
//!
//! ## Example Usage
//!
//! ```rust
//! use std::io::Cursor;
//! use chrono::Utc;
//! use domain::{upload_file, Clock, FixedClock, UploadFileArgs};
//!
//! let clock = FixedClock::new(Utc::now());
//! let file = upload_file(UploadFileArgs {
//!     id: "file1".into(),
//!     name: "notes.txt".to_string(),
//!     owner: "user1".into(),
//!     reader: Some(Box::new(Cursor::new(b"hello".to_vec()))),
//!     size: 5,
//!     clock: Some(&clock),
//!     ..Default::default()
//! })
//! .unwrap();
//! assert_eq!(file.header.created, clock.now());
//! ```
//!
//! ## Modules
//!
//! - [`file`]: File headers, upload and download rules, listing order
//! - [`user`]: Users and credentials
//! - [`ids`]: Identifier newtypes and generators
//! - [`services`]: Clock and password hasher traits
//! - [`duration`]: Day and week aware durations
//! - [`error`]: Error types

pub mod duration;
pub mod error;
pub mod file;
pub mod ids;
pub mod services;
pub mod user;

pub use duration::LongDuration;
pub use error::{DomainError, DownloadError, Result};
pub use file::{listing_order, sort_for_listing, upload_file, File, FileHeader, UploadFileArgs};
pub use ids::{generate_file_id, generate_user_id, FileId, UserId, Username};
pub use services::{Clock, FixedClock, HashError, PasswordHasher, SystemClock};
pub use user::{
    create_user, parse_username, Credentials, User, DEFAULT_MIN_PASSWORD_LENGTH,
    MIN_USERNAME_LENGTH,
};
