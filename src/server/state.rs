//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::config::Config;
use crate::db::Database;
use crate::library::{Catalog, ShelfService};
use crate::uploads::UploadStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Book catalog.
    pub catalog: Catalog,
    /// Shelves and reading progress.
    pub shelves: ShelfService,
    /// Profile photo storage.
    pub uploads: UploadStore,
}

impl AppState {
    /// Build every service on top of one database handle.
    pub fn new(config: Config, db: Database) -> Self {
        let auth = AuthService::new(db.clone(), &config.auth);
        Self {
            auth: Arc::new(auth),
            catalog: Catalog::new(db.clone()),
            shelves: ShelfService::new(db.clone()),
            uploads: UploadStore::new(&config.uploads),
            config: Arc::new(config),
            db,
        }
    }
}
