//! HTTP request handlers.

use crate::auth::NewUser;
use crate::db::{self, Book, PublicUser};
use crate::error::{AppError, Result};
use crate::library::{NewBook, ShelfUpdate, Shelves};
use crate::server::AppState;
use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartError, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
};
use serde::{Deserialize, Serialize};

/// JSON body that reports malformed input as a typed validation error.
type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

// ============================================================================
// HEALTH
// ============================================================================

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: &'static str,
    title: String,
    version: &'static str,
}

/// Health check.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, database) = match state.db.ping() {
        Ok(()) => (StatusCode::OK, "connected"),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "disconnected")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: if status.is_success() {
                "healthy"
            } else {
                "unhealthy"
            },
            database,
            title: state.config.server.title.clone(),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

// ============================================================================
// AUTH API
// ============================================================================

/// Register request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    email: String,
    password: String,
    name: String,
    photo: Option<String>,
}

/// Register response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    success: bool,
    inserted_id: String,
}

/// Login request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    email: String,
    password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    success: bool,
    user: PublicUser,
    token: String,
}

/// Current user response.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    success: bool,
    user: PublicUser,
}

/// Auth register.
pub async fn auth_register(
    State(state): State<AppState>,
    body: JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let Json(req) = body?;
    let new_user = NewUser {
        email: req.email,
        password: req.password,
        name: req.name,
        photo: req.photo,
    };

    // bcrypt at a high cost takes around a second; keep it off the runtime threads.
    let auth = state.auth.clone();
    let user = tokio::task::spawn_blocking(move || auth.register(&new_user)).await??;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            inserted_id: user.id,
        }),
    ))
}

/// Auth login.
pub async fn auth_login(
    State(state): State<AppState>,
    body: JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let Json(req) = body?;

    let auth = state.auth.clone();
    let (user, token) =
        tokio::task::spawn_blocking(move || auth.login(&req.email, &req.password)).await??;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        success: true,
        user: user.public(),
        token,
    }))
}

/// Auth logout.
pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(token) = extract_token(&headers) {
        state.auth.logout(&token)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Get current user info.
pub async fn auth_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>> {
    let user = get_authenticated_user(&state, &headers)?;
    Ok(Json(UserResponse {
        success: true,
        user: user.public(),
    }))
}

// ============================================================================
// UPLOAD API
// ============================================================================

/// Upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    success: bool,
    url: String,
}

/// Store an image sent as the multipart field `file`.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let max_bytes = state.uploads.max_bytes();
    let multipart_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge { max_bytes }
        } else {
            AppError::Validation(e.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;
        let url = state.uploads.save(content_type.as_deref(), &data).await?;

        return Ok(Json(UploadResponse { success: true, url }));
    }

    Err(AppError::Validation("No file uploaded".to_string()))
}

// ============================================================================
// BOOKS API
// ============================================================================

/// Book search parameters.
#[derive(Debug, Deserialize)]
pub struct BookQuery {
    q: Option<String>,
}

/// Book list response.
#[derive(Debug, Serialize)]
pub struct BooksResponse {
    success: bool,
    books: Vec<Book>,
}

/// Single book response.
#[derive(Debug, Serialize)]
pub struct BookResponse {
    success: bool,
    book: Book,
}

/// List or search books.
pub async fn books_list(
    State(state): State<AppState>,
    Query(params): Query<BookQuery>,
) -> Result<Json<BooksResponse>> {
    let books = state.catalog.list(params.q.as_deref())?;
    Ok(Json(BooksResponse {
        success: true,
        books,
    }))
}

/// Book details.
pub async fn books_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookResponse>> {
    let book = state.catalog.get(&id)?;
    Ok(Json(BookResponse {
        success: true,
        book,
    }))
}

/// Add a book to the catalog (admin only).
pub async fn books_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<NewBook>,
) -> Result<(StatusCode, Json<BookResponse>)> {
    let user = get_authenticated_user(&state, &headers)?;
    if !state.auth.is_admin(&user) {
        return Err(AppError::Forbidden(
            "Only admins can add books".to_string(),
        ));
    }

    let Json(req) = body?;
    let book = state.catalog.add(&req)?;

    Ok((
        StatusCode::CREATED,
        Json(BookResponse {
            success: true,
            book,
        }),
    ))
}

// ============================================================================
// SHELF API
// ============================================================================

/// Shelves snapshot response.
#[derive(Debug, Serialize)]
pub struct ShelvesResponse {
    success: bool,
    shelves: Shelves,
}

impl From<Shelves> for ShelvesResponse {
    fn from(shelves: Shelves) -> Self {
        Self {
            success: true,
            shelves,
        }
    }
}

/// Get the current user's shelves.
pub async fn shelf_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ShelvesResponse>> {
    let user = get_authenticated_user(&state, &headers)?;
    let shelves = state.shelves.shelves(&user.id)?;
    Ok(Json(shelves.into()))
}

/// Place a book on a shelf or update its progress.
pub async fn shelf_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: JsonBody<ShelfUpdate>,
) -> Result<Json<ShelvesResponse>> {
    let user = get_authenticated_user(&state, &headers)?;
    let Json(req) = body?;
    let shelves = state.shelves.update(&user.id, &req)?;
    Ok(Json(shelves.into()))
}

/// Remove a book from the current user's shelves.
pub async fn shelf_remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> Result<Json<ShelvesResponse>> {
    let user = get_authenticated_user(&state, &headers)?;
    let shelves = state.shelves.remove(&user.id, &book_id)?;
    Ok(Json(shelves.into()))
}

// ============================================================================
// HELPERS
// ============================================================================

/// Extract token from Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Get authenticated user from token.
fn get_authenticated_user(state: &AppState, headers: &HeaderMap) -> Result<db::User> {
    let token = extract_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    state
        .auth
        .validate_token(&token)?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
}
