//! Book catalog and per-user shelves.

pub mod catalog;
pub mod shelf;

pub use catalog::{Catalog, NewBook};
pub use shelf::{ShelfItem, ShelfService, ShelfUpdate, Shelves};
