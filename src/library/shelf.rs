//! Per-user shelves and reading progress.

use crate::db::{Book, Database, Shelf, ShelfEntry, now_timestamp};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Percentage of the book read, rounded to the nearest integer.
///
/// Not clamped: 120 pages read out of 100 reports 120.
/// `None` when the page count is unknown or zero.
pub fn percentage(progress: Option<i64>, total_pages: Option<i64>) -> Option<i64> {
    let total = total_pages.filter(|t| *t > 0)?;
    let progress = progress.unwrap_or(0);
    Some((progress as f64 / total as f64 * 100.0).round() as i64)
}

/// Width of a progress bar in percent, capped at 100.
pub fn bar_width(progress: Option<i64>, total_pages: Option<i64>) -> Option<f64> {
    let total = total_pages.filter(|t| *t > 0)?;
    let progress = progress.unwrap_or(0);
    Some((progress as f64 / total as f64 * 100.0).min(100.0))
}

/// A shelved book as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfItem {
    /// Book ID.
    pub book_id: String,
    /// Book metadata.
    pub book: Book,
    /// Shelf the book is on.
    pub shelf: Shelf,
    /// Pages read, raw.
    pub progress: Option<i64>,
    /// Effective page count: the entry's own, else the book's.
    pub total_pages: Option<i64>,
    /// Rounded, unclamped percentage.
    pub percentage: Option<i64>,
    /// When the book was shelved.
    pub added_at: i64,
    /// Last change.
    pub updated_at: i64,
}

impl ShelfItem {
    fn new(entry: ShelfEntry, book: Book) -> Self {
        let total_pages = entry.total_pages.or(book.total_pages);
        Self {
            book_id: entry.book_id,
            shelf: entry.shelf,
            progress: entry.progress,
            total_pages,
            percentage: percentage(entry.progress, total_pages),
            added_at: entry.added_at,
            updated_at: entry.updated_at,
            book,
        }
    }

    /// Progress bar width for this item.
    pub fn bar_width(&self) -> Option<f64> {
        bar_width(self.progress, self.total_pages)
    }
}

/// Snapshot of all three shelves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shelves {
    /// Planned reads.
    pub want_to_read: Vec<ShelfItem>,
    /// In progress.
    pub currently_reading: Vec<ShelfItem>,
    /// Finished.
    pub read: Vec<ShelfItem>,
}

impl Shelves {
    /// Items on one shelf.
    pub fn get(&self, shelf: Shelf) -> &[ShelfItem] {
        match shelf {
            Shelf::WantToRead => &self.want_to_read,
            Shelf::CurrentlyReading => &self.currently_reading,
            Shelf::Read => &self.read,
        }
    }

    fn get_mut(&mut self, shelf: Shelf) -> &mut Vec<ShelfItem> {
        match shelf {
            Shelf::WantToRead => &mut self.want_to_read,
            Shelf::CurrentlyReading => &mut self.currently_reading,
            Shelf::Read => &mut self.read,
        }
    }

    /// Find a book on any shelf.
    pub fn find(&self, book_id: &str) -> Option<&ShelfItem> {
        Shelf::ALL
            .into_iter()
            .flat_map(|shelf| self.get(shelf))
            .find(|item| item.book_id == book_id)
    }

    /// Total number of shelved books.
    pub fn len(&self) -> usize {
        self.want_to_read.len() + self.currently_reading.len() + self.read.len()
    }

    /// True when every shelf is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<(ShelfEntry, Book)> for Shelves {
    fn from_iter<I: IntoIterator<Item = (ShelfEntry, Book)>>(iter: I) -> Self {
        let mut shelves = Shelves::default();
        for (entry, book) in iter {
            shelves.get_mut(entry.shelf).push(ShelfItem::new(entry, book));
        }
        shelves
    }
}

/// Place a book on a shelf, optionally recording progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfUpdate {
    /// Book to place.
    pub book_id: String,
    /// Target shelf.
    pub shelf: Shelf,
    /// Pages read; only accepted for `currentlyReading`.
    #[serde(default)]
    pub progress: Option<i64>,
    /// Page count override for this user's copy.
    #[serde(default)]
    pub total_pages: Option<i64>,
}

/// Shelf operations over the shared database.
#[derive(Clone)]
pub struct ShelfService {
    db: Database,
}

impl ShelfService {
    /// Create a shelf service.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All shelves of a user.
    pub fn shelves(&self, user_id: &str) -> Result<Shelves> {
        Ok(self
            .db
            .get_user_shelf_entries(user_id)?
            .into_iter()
            .collect())
    }

    /// Add, move, or update progress for a book, then return the new snapshot.
    pub fn update(&self, user_id: &str, update: &ShelfUpdate) -> Result<Shelves> {
        if let Some(progress) = update.progress {
            if progress < 0 {
                return Err(AppError::Validation(
                    "Progress cannot be negative".to_string(),
                ));
            }
            if update.shelf != Shelf::CurrentlyReading {
                return Err(AppError::Validation(format!(
                    "Progress can only be tracked on the {} shelf",
                    Shelf::CurrentlyReading
                )));
            }
        }

        if let Some(total) = update.total_pages
            && total <= 0
        {
            return Err(AppError::Validation(
                "Total pages must be greater than 0".to_string(),
            ));
        }

        if self.db.get_book(&update.book_id)?.is_none() {
            return Err(AppError::NotFound(format!(
                "Book not found: {}",
                update.book_id
            )));
        }

        let now = now_timestamp();
        let entry = ShelfEntry {
            user_id: user_id.to_string(),
            book_id: update.book_id.clone(),
            shelf: update.shelf,
            progress: update.progress,
            total_pages: update.total_pages,
            added_at: now,
            updated_at: now,
        };

        // Omitted progress and page count keep their stored values.
        self.db.save_shelf_entry(&entry)?;
        tracing::info!(
            user_id,
            book_id = %entry.book_id,
            shelf = %entry.shelf,
            progress = ?entry.progress,
            "Shelf updated"
        );

        self.shelves(user_id)
    }

    /// Take a book off the user's shelves.
    pub fn remove(&self, user_id: &str, book_id: &str) -> Result<Shelves> {
        if !self.db.delete_shelf_entry(user_id, book_id)? {
            return Err(AppError::NotFound(format!(
                "Book is not on your shelves: {}",
                book_id
            )));
        }

        tracing::info!(user_id, book_id, "Removed from shelves");
        self.shelves(user_id)
    }
}
