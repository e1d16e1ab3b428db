//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use crate::uploads::UPLOAD_URL_PREFIX;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth_register))
        .route("/login", post(handlers::auth_login))
        .route("/logout", post(handlers::auth_logout))
        .route("/me", get(handlers::auth_me));

    let shelf_routes = Router::new()
        .route(
            "/shelf",
            get(handlers::shelf_get).post(handlers::shelf_update),
        )
        .route("/shelf/{book_id}", delete(handlers::shelf_remove));

    let upload_limit = DefaultBodyLimit::max(
        state
            .uploads
            .max_bytes()
            .saturating_add(MULTIPART_OVERHEAD_BYTES),
    );

    Router::new()
        .route("/api/health", get(handlers::health))
        .nest("/api/auth", auth_routes)
        .route(
            "/api/books",
            get(handlers::books_list).post(handlers::books_create),
        )
        .route("/api/books/{id}", get(handlers::books_get))
        .nest("/api/users", shelf_routes)
        .route("/api/upload", post(handlers::upload).layer(upload_limit))
        .nest_service(UPLOAD_URL_PREFIX, ServeDir::new(state.uploads.dir()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
