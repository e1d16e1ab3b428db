//! bookworm: a book tracking server with personal shelves and reading progress.
//!
//! Readers register with email and password, browse the book catalog and
//! keep three shelves (want to read, currently reading, read) with
//! pages-read progress on the books in progress.
//!
//! # Features
//!
//! - Email/password accounts with bcrypt or Argon2 hashes
//! - Bearer-token sessions
//! - Storage-enforced unique emails
//! - Shelves with raw (unclamped) reading progress
//! - Profile photo uploads
//! - Typed HTTP client

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Typed HTTP client.
pub mod client;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Book catalog and shelves.
pub mod library;
/// HTTP server.
pub mod server;
/// Upload storage.
pub mod uploads;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
