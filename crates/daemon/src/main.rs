//! Blinkfile
//!
//! Command line tool and daemon for sharing files through expiring links.

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use daemon::app::{App, UploadArgs};
use daemon::config::Config;
use domain::{FileHeader, FileId, LongDuration, UserId};
use tokio_util::sync::CancellationToken;

/// Blinkfile - share files through links that can expire or need a password.
#[derive(Parser, Debug)]
#[command(name = "blinkfile")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Open the stores and run the expiry sweeper until interrupted
    Serve,

    /// Delete expired files once and exit
    Sweep,

    /// Manage stored files
    #[command(subcommand)]
    Files(FilesCommands),

    /// Manage users
    #[command(subcommand)]
    Users(UsersCommands),
}

/// Subcommands for file management.
#[derive(Subcommand, Debug, Clone)]
pub enum FilesCommands {
    /// List a user's files
    List {
        /// Owning user ID
        #[arg(long)]
        owner: String,
    },

    /// Upload a file
    Upload {
        /// Owning user ID
        #[arg(long)]
        owner: String,

        /// File to upload
        path: PathBuf,

        /// Display name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// Password required to download
        #[arg(long)]
        password: Option<String>,

        /// Expire after this long, e.g. 12h, 3d or 1.5w
        #[arg(long, conflicts_with = "expires")]
        expires_in: Option<LongDuration>,

        /// Expire at this RFC 3339 time
        #[arg(long, value_parser = parse_rfc3339)]
        expires: Option<DateTime<Utc>>,
    },

    /// Download a file
    Download {
        /// File ID
        file_id: String,

        /// Download as this user ID
        #[arg(long)]
        as_user: Option<String>,

        /// File password
        #[arg(long)]
        password: Option<String>,

        /// Where to write the content
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Delete files
    Delete {
        /// Owning user ID
        #[arg(long)]
        owner: String,

        /// File IDs to delete
        #[arg(required = true)]
        file_ids: Vec<String>,
    },
}

/// Subcommands for user management.
#[derive(Subcommand, Debug, Clone)]
pub enum UsersCommands {
    /// Create a user
    Create {
        /// Login name
        username: String,

        /// Login password
        #[arg(long)]
        password: String,
    },

    /// List all users
    List,

    /// Delete users with all their files
    Delete {
        /// User IDs to delete
        #[arg(required = true)]
        user_ids: Vec<String>,
    },

    /// Change a user's password
    Passwd {
        /// User ID
        user_id: String,

        /// New password
        #[arg(long)]
        password: String,
    },
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time {s:?}: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };
    config.apply_env_overrides();

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.to_lowercase()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate()?;

    let cancel = CancellationToken::new();
    let app = App::open(&config, &cancel)?;

    match cli.command {
        Commands::Serve => run_serve(&app, &config, cancel).await?,
        Commands::Sweep => {
            let report = app.sweeper().run_once()?;
            println!(
                "Deleted {} expired file(s) in {:?}",
                report.deleted, report.elapsed
            );
        }
        Commands::Files(cmd) => run_files(&app, cmd)?,
        Commands::Users(cmd) => run_users(&app, cmd)?,
    }

    Ok(())
}

/// Run the expiry sweeper until a shutdown signal arrives.
async fn run_serve(app: &App, config: &Config, cancel: CancellationToken) -> anyhow::Result<()> {
    tracing::info!("Blinkfile daemon starting (data dir: {:?})", config.daemon.data_dir);

    let sweeper = if config.sweeper.enabled {
        tracing::info!(
            "Running expiry sweeper every {} seconds",
            config.sweeper.interval_secs
        );
        Some(app.sweeper().spawn(config.sweeper.interval(), cancel.clone()))
    } else {
        tracing::info!("Expiry sweeper disabled");
        None
    };

    wait_for_shutdown_signal().await?;
    cancel.cancel();

    if let Some(handle) = sweeper {
        handle.await.context("Expiry sweeper task failed")?;
    }
    tracing::info!("Blinkfile daemon stopped");
    Ok(())
}

/// Wait for SIGTERM or SIGINT.
async fn wait_for_shutdown_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

fn run_files(app: &App, cmd: FilesCommands) -> anyhow::Result<()> {
    match cmd {
        FilesCommands::List { owner } => {
            let files = app.list_files(&UserId::from(owner))?;
            if files.is_empty() {
                println!("No files.");
            } else {
                for header in &files {
                    println!("{}", format_header(header));
                }
            }
        }
        FilesCommands::Upload {
            owner,
            path,
            name,
            password,
            expires_in,
            expires,
        } => {
            let file = fs::File::open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let size = file
                .metadata()
                .with_context(|| format!("Failed to stat {}", path.display()))?
                .len();
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("Upload path has no file name; pass --name")?,
            };

            let id = app.upload_file(UploadArgs {
                name,
                owner: UserId::from(owner),
                reader: Box::new(file),
                size,
                password: password.unwrap_or_default(),
                expires_in: expires_in.unwrap_or_default(),
                expires,
            })?;
            println!("{}", id);
        }
        FilesCommands::Download {
            file_id,
            as_user,
            password,
            output,
        } => {
            let requester = UserId::from(as_user.unwrap_or_default());
            let (header, mut content) = app.download_file(
                &requester,
                &FileId::from(file_id),
                password.as_deref().unwrap_or_default(),
            )?;
            let mut out = fs::File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let written = io::copy(&mut content, &mut out)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {} ({} bytes) to {}", header.name, written, output.display());
        }
        FilesCommands::Delete { owner, file_ids } => {
            let ids: Vec<FileId> = file_ids.into_iter().map(FileId::from).collect();
            app.delete_files(&UserId::from(owner), &ids)?;
            println!("Deleted {} file(s)", ids.len());
        }
    }
    Ok(())
}

fn run_users(app: &App, cmd: UsersCommands) -> anyhow::Result<()> {
    match cmd {
        UsersCommands::Create { username, password } => {
            let id = app.create_user(&username, &password)?;
            println!("{}", id);
        }
        UsersCommands::List => {
            let users = app.list_users()?;
            if users.is_empty() {
                println!("No users.");
            } else {
                for user in &users {
                    println!(
                        "{}  {}  created {}",
                        user.id,
                        user.username,
                        user.created.to_rfc3339()
                    );
                }
            }
        }
        UsersCommands::Delete { user_ids } => {
            let ids: Vec<UserId> = user_ids.into_iter().map(UserId::from).collect();
            app.delete_users(&ids)?;
            println!("Deleted {} user(s)", ids.len());
        }
        UsersCommands::Passwd { user_id, password } => {
            let username = app.change_password(&UserId::from(user_id), &password)?;
            println!("Changed password for {}", username);
        }
    }
    Ok(())
}

fn format_header(header: &FileHeader) -> String {
    let expires = header
        .expires
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    let lock = if header.has_password() { " (password)" } else { "" };
    format!(
        "{}  {}  {} bytes  created {}  expires {}{}",
        header.id,
        header.name,
        header.size,
        header.created.to_rfc3339(),
        expires,
        lock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from(["blinkfile", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags() {
        let cli =
            Cli::try_parse_from(["blinkfile", "sweep", "-v", "--config", "/tmp/c.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_upload_command() {
        let cli = Cli::try_parse_from([
            "blinkfile",
            "files",
            "upload",
            "--owner",
            "u1",
            "report.pdf",
            "--expires-in",
            "3d",
        ])
        .unwrap();
        match cli.command {
            Commands::Files(FilesCommands::Upload {
                owner,
                path,
                expires_in,
                expires,
                ..
            }) => {
                assert_eq!(owner, "u1");
                assert_eq!(path, PathBuf::from("report.pdf"));
                assert_eq!(expires_in, Some(LongDuration::new("3d")));
                assert!(expires.is_none());
            }
            _ => panic!("Expected Files Upload command"),
        }
    }

    #[test]
    fn test_upload_rejects_bad_duration() {
        let result = Cli::try_parse_from([
            "blinkfile",
            "files",
            "upload",
            "--owner",
            "u1",
            "a.txt",
            "--expires-in",
            "3y",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_upload_rejects_both_expirations() {
        let result = Cli::try_parse_from([
            "blinkfile",
            "files",
            "upload",
            "--owner",
            "u1",
            "a.txt",
            "--expires-in",
            "3d",
            "--expires",
            "2030-01-01T00:00:00Z",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_requires_ids() {
        assert!(Cli::try_parse_from(["blinkfile", "files", "delete", "--owner", "u1"]).is_err());
        let cli = Cli::try_parse_from(["blinkfile", "files", "delete", "--owner", "u1", "a", "b"])
            .unwrap();
        match cli.command {
            Commands::Files(FilesCommands::Delete { file_ids, .. }) => {
                assert_eq!(file_ids, vec!["a", "b"]);
            }
            _ => panic!("Expected Files Delete command"),
        }
    }

    #[test]
    fn test_users_passwd_command() {
        let cli = Cli::try_parse_from([
            "blinkfile",
            "users",
            "passwd",
            "u1",
            "--password",
            "0123456789abcdef",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Users(UsersCommands::Passwd { .. })
        ));
    }

    #[test]
    fn test_parse_rfc3339() {
        let t = parse_rfc3339("2030-01-01T01:00:00+01:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2030-01-01T00:00:00+00:00");
        assert!(parse_rfc3339("tomorrow").is_err());
    }
}
