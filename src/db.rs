mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider tag for accounts created with email and password.
pub const CREDENTIALS_PROVIDER: &str = "credentials";

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular reader.
    #[default]
    User,
    /// Can manage the book catalog.
    Admin,
}

impl Role {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Role must be 'admin' or 'user', got '{}'", other)),
        }
    }
}

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login email, lower-cased.
    pub email: String,
    /// Password hash (bcrypt or Argon2 PHC string).
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Authentication method tag.
    pub provider: String,
    /// User role.
    pub role: Role,
    /// Profile photo URL.
    pub photo: Option<String>,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

impl User {
    /// Projection returned to clients after login.
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Sanitized user: never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    /// User ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email.
    pub email: String,
    /// Role.
    pub role: Role,
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: String,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Book in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Book ID.
    pub id: String,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Cover image URL.
    pub cover_image: Option<String>,
    /// Page count, if known.
    pub total_pages: Option<i64>,
    /// Summary.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Shelf category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Shelf {
    /// Books the user plans to read.
    WantToRead,
    /// Books in progress; the only shelf that tracks pages read.
    CurrentlyReading,
    /// Finished books.
    Read,
}

impl Shelf {
    /// All shelves in display order.
    pub const ALL: [Shelf; 3] = [Shelf::WantToRead, Shelf::CurrentlyReading, Shelf::Read];

    /// Stored representation (same as the wire name).
    pub fn as_str(&self) -> &'static str {
        match self {
            Shelf::WantToRead => "wantToRead",
            Shelf::CurrentlyReading => "currentlyReading",
            Shelf::Read => "read",
        }
    }
}

impl fmt::Display for Shelf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shelf {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Shelf::ALL
            .into_iter()
            .find(|shelf| shelf.as_str() == s)
            .ok_or_else(|| format!("Unknown shelf '{}'", s))
    }
}

/// A book placed on one of a user's shelves.
#[derive(Debug, Clone, PartialEq)]
pub struct ShelfEntry {
    /// Owner.
    pub user_id: String,
    /// Referenced book.
    pub book_id: String,
    /// Current shelf.
    pub shelf: Shelf,
    /// Pages read. Stored as sent, never clamped to the page count.
    pub progress: Option<i64>,
    /// Per-entry page count, overrides the book's.
    pub total_pages: Option<i64>,
    /// When the book was first shelved.
    pub added_at: i64,
    /// Last change.
    pub updated_at: i64,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
