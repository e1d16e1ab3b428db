use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, provider, role, photo, created_at, last_login";

const BOOK_COLUMNS: &str = "id, title, author, cover_image, total_pages, description, created_at";

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table; the UNIQUE email is what keeps concurrent
            -- registrations from creating duplicates.
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                provider TEXT NOT NULL DEFAULT 'credentials',
                role TEXT NOT NULL DEFAULT 'user',
                photo TEXT,
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Book catalog
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL DEFAULT '',
                cover_image TEXT,
                total_pages INTEGER,
                description TEXT,
                created_at INTEGER NOT NULL
            );

            -- One row per (user, book): a book sits on a single shelf
            CREATE TABLE IF NOT EXISTS shelf_entries (
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                shelf TEXT NOT NULL,
                progress INTEGER,
                total_pages INTEGER,
                added_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);
            CREATE INDEX IF NOT EXISTS idx_shelf_user ON shelf_entries(user_id);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Cheap connectivity probe for the health endpoint.
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| AppError::Internal(format!("Database ping failed: {}", e)))?;
        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    ///
    /// A duplicate email fails with [`AppError::Conflict`] even when two
    /// callers both passed an earlier existence check.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, provider, role, photo, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user.id,
                user.name,
                user.email,
                user.password_hash,
                user.provider,
                user.role,
                user.photo,
                user.created_at,
                user.last_login,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Email '{}' is already registered", user.email))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;
        Ok(())
    }

    /// Get user by email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            params![email],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM users ORDER BY email", USER_COLUMNS))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Update user password.
    pub fn update_user_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE email = ?2",
                params![password_hash, email],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_user_last_login(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }

    /// Delete user. Sessions and shelf entries go with it.
    pub fn delete_user(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM users WHERE email = ?1", params![email])
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            provider: row.get(4)?,
            role: row.get(5)?,
            photo: row.get(6)?,
            created_at: row.get(7)?,
            last_login: row.get(8)?,
        })
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }

    // ========== BOOK OPERATIONS ==========

    /// Insert a book into the catalog.
    pub fn create_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books (id, title, author, cover_image, total_pages, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                book.id,
                book.title,
                book.author,
                book.cover_image,
                book.total_pages,
                book.description,
                book.created_at,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Book '{}' already exists", book.id))
            } else {
                AppError::Internal(format!("Failed to save book: {}", e))
            }
        })?;
        Ok(())
    }

    /// Get book by ID.
    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS),
            params![id],
            |row| Self::row_to_book(row, 0),
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// List books ordered by title, optionally filtered by a
    /// case-insensitive title/author substring.
    ///
    /// Matching is done in Rust: SQLite's `lower()` only folds ASCII.
    pub fn list_books(&self, query: Option<&str>) -> Result<Vec<Book>> {
        let needle = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM books ORDER BY title COLLATE NOCASE, id",
                BOOK_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map([], |row| Self::row_to_book(row, 0))
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        let Some(needle) = needle else {
            return Ok(books);
        };

        Ok(books
            .into_iter()
            .filter(|book| {
                book.title.to_lowercase().contains(&needle)
                    || book.author.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// Delete a book. It also disappears from every shelf.
    pub fn delete_book(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM books WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete book: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_book(row: &Row<'_>, offset: usize) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get(offset)?,
            title: row.get(offset + 1)?,
            author: row.get(offset + 2)?,
            cover_image: row.get(offset + 3)?,
            total_pages: row.get(offset + 4)?,
            description: row.get(offset + 5)?,
            created_at: row.get(offset + 6)?,
        })
    }

    // ========== SHELF OPERATIONS ==========

    /// Insert the user's entry for a book, or update it in place.
    ///
    /// On update, `added_at` is preserved and a `None` progress or page
    /// count leaves the stored value untouched.
    pub fn save_shelf_entry(&self, entry: &ShelfEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO shelf_entries
             (user_id, book_id, shelf, progress, total_pages, added_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (user_id, book_id) DO UPDATE SET
                shelf = excluded.shelf,
                progress = COALESCE(excluded.progress, progress),
                total_pages = COALESCE(excluded.total_pages, total_pages),
                updated_at = excluded.updated_at",
            params![
                entry.user_id,
                entry.book_id,
                entry.shelf,
                entry.progress,
                entry.total_pages,
                entry.added_at,
                entry.updated_at,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save shelf entry: {}", e)))?;
        Ok(())
    }

    /// Get the user's entry for a book.
    pub fn get_shelf_entry(&self, user_id: &str, book_id: &str) -> Result<Option<ShelfEntry>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT user_id, book_id, shelf, progress, total_pages, added_at, updated_at
             FROM shelf_entries WHERE user_id = ?1 AND book_id = ?2",
            params![user_id, book_id],
            Self::row_to_shelf_entry,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get shelf entry: {}", e)))
    }

    /// All of a user's shelf entries joined with their books, in the order
    /// they were shelved.
    pub fn get_user_shelf_entries(&self, user_id: &str) -> Result<Vec<(ShelfEntry, Book)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT s.user_id, s.book_id, s.shelf, s.progress, s.total_pages,
                        s.added_at, s.updated_at,
                        b.id, b.title, b.author, b.cover_image, b.total_pages,
                        b.description, b.created_at
                 FROM shelf_entries s
                 JOIN books b ON b.id = s.book_id
                 WHERE s.user_id = ?1
                 ORDER BY s.added_at, s.rowid",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let entries = stmt
            .query_map(params![user_id], |row| {
                Ok((Self::row_to_shelf_entry(row)?, Self::row_to_book(row, 7)?))
            })
            .map_err(|e| AppError::Internal(format!("Failed to get shelves: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect shelves: {}", e)))?;

        Ok(entries)
    }

    /// Remove a book from the user's shelves.
    pub fn delete_shelf_entry(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM shelf_entries WHERE user_id = ?1 AND book_id = ?2",
                params![user_id, book_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to delete shelf entry: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_shelf_entry(row: &Row<'_>) -> rusqlite::Result<ShelfEntry> {
        Ok(ShelfEntry {
            user_id: row.get(0)?,
            book_id: row.get(1)?,
            shelf: row.get(2)?,
            progress: row.get(3)?,
            total_pages: row.get(4)?,
            added_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Shelf {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Shelf {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}
