//! Book catalog.

use crate::db::{Book, Database, now_timestamp};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input for adding a book to the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Author.
    #[serde(default)]
    pub author: String,
    /// Cover image URL.
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Page count.
    #[serde(default)]
    pub total_pages: Option<i64>,
    /// Summary.
    #[serde(default)]
    pub description: Option<String>,
}

/// Catalog operations over the shared database.
#[derive(Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    /// Create a catalog handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a book.
    pub fn add(&self, new_book: &NewBook) -> Result<Book> {
        let title = new_book.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }

        if let Some(pages) = new_book.total_pages
            && pages <= 0
        {
            return Err(AppError::Validation(
                "Total pages must be greater than 0".to_string(),
            ));
        }

        let book = Book {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            author: new_book.author.trim().to_string(),
            cover_image: new_book.cover_image.clone().filter(|c| !c.trim().is_empty()),
            total_pages: new_book.total_pages,
            description: new_book.description.clone(),
            created_at: now_timestamp(),
        };

        self.db.create_book(&book)?;
        tracing::info!(book_id = %book.id, title = %book.title, "Book added");
        Ok(book)
    }

    /// Get a book or fail with `NotFound`.
    pub fn get(&self, id: &str) -> Result<Book> {
        self.db
            .get_book(id)?
            .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))
    }

    /// List books, optionally filtered by title or author.
    pub fn list(&self, query: Option<&str>) -> Result<Vec<Book>> {
        self.db.list_books(query)
    }

    /// Remove a book.
    pub fn remove(&self, id: &str) -> Result<bool> {
        self.db.delete_book(id)
    }
}
