use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// Book tracking server with personal shelves and reading progress.
#[derive(Parser, Debug, Clone)]
#[command(name = "bookworm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOKWORM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long, env = "BOOKWORM_BIND")]
        bind: Option<SocketAddr>,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Book catalog commands.
    Book {
        /// Book subcommand action.
        #[command(subcommand)]
        action: BookCommand,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Add a new user.
    Add {
        /// Login email.
        email: String,
        /// Display name (defaults to the part of the email before '@').
        #[arg(short, long)]
        name: Option<String>,
        /// Password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
        /// User role (admin or user).
        #[arg(short, long, default_value = "user")]
        role: String,
    },

    /// Delete a user.
    Del {
        /// Email of the user to delete.
        email: String,
    },

    /// List all users.
    List,

    /// Change user password.
    Passwd {
        /// Email.
        email: String,
        /// New password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
    },
}

/// Book catalog subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum BookCommand {
    /// Add a book to the catalog.
    Add {
        /// Title.
        title: String,
        /// Author.
        #[arg(short, long, default_value = "")]
        author: String,
        /// Page count.
        #[arg(long)]
        pages: Option<i64>,
        /// Cover image URL.
        #[arg(long)]
        cover: Option<String>,
        /// Short description.
        #[arg(long)]
        description: Option<String>,
    },

    /// Remove a book (and every shelf entry pointing at it).
    Del {
        /// Book ID.
        id: String,
    },

    /// List books.
    List {
        /// Only show books whose title or author contains this text.
        query: Option<String>,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Upload configuration.
    #[serde(default)]
    pub uploads: UploadConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Site title, reported by the health endpoint.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

fn default_title() -> String {
    "BookWorm".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/bookworm.db")
}

/// Password hashing scheme for new hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordScheme {
    /// bcrypt at `bcrypt_cost`.
    #[default]
    Bcrypt,
    /// Argon2id with default parameters.
    Argon2,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Registration mode: "open", "disabled".
    #[serde(default = "default_registration")]
    pub registration: String,

    /// Session token duration in days.
    #[serde(default = "default_session_days")]
    pub session_days: u32,

    /// Scheme used for new password hashes.
    #[serde(default)]
    pub password_hash: PasswordScheme,

    /// bcrypt work factor (4-31).
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    /// Minimum password length in characters.
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            registration: default_registration(),
            session_days: default_session_days(),
            password_hash: PasswordScheme::default(),
            bcrypt_cost: default_bcrypt_cost(),
            min_password_length: default_min_password_length(),
        }
    }
}

fn default_registration() -> String {
    "open".to_string()
}

fn default_session_days() -> u32 {
    30
}

fn default_bcrypt_cost() -> u32 {
    14
}

fn default_min_password_length() -> usize {
    6
}

impl AuthConfig {
    /// Check if registration is enabled.
    pub fn registration_enabled(&self) -> bool {
        self.registration == "open"
    }
}

/// Upload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Directory uploaded files are written to.
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,

    /// Maximum accepted file size in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

/// 5 MB, the same cap the client applies before sending.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(AppError::Config(format!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.auth.bcrypt_cost
            )));
        }

        if self.auth.registration != "open" && self.auth.registration != "disabled" {
            return Err(AppError::Config(format!(
                "auth.registration must be \"open\" or \"disabled\", got \"{}\"",
                self.auth.registration
            )));
        }

        if self.uploads.max_bytes == 0 {
            return Err(AppError::Config(
                "uploads.max_bytes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("bookworm.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("bookworm").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/bookworm/config.toml"),
        ];

        candidates.into_iter().find(|p| p.is_file())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# bookworm configuration

[server]
bind = "0.0.0.0:8080"
title = "BookWorm"

[database]
# path = "/var/lib/bookworm/bookworm.db"

[auth]
# Registration mode: "open" or "disabled"
registration = "open"
# Session duration in days
session_days = 30
# Scheme for new password hashes: "bcrypt" or "argon2"
password_hash = "bcrypt"
# bcrypt work factor
bcrypt_cost = 14
min_password_length = 6

[uploads]
# dir = "/var/lib/bookworm/uploads"
# Maximum profile photo size in bytes (5 MB)
max_bytes = 5242880
"#
        .to_string()
    }
}
