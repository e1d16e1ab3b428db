//! Typed HTTP client for the bookworm API.
//!
//! Mirrors what the web pages do: register, log in, browse books, read and
//! update shelves, upload a profile photo. Oversized photos are refused
//! locally before any request is sent.

use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::db::{Book, PublicUser, Shelf};
use crate::library::{ShelfUpdate, Shelves};
use reqwest::{RequestBuilder, Response, Url, multipart};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("bookworm-client/", env!("CARGO_PKG_VERSION"));

/// Largest photo the client will try to upload.
pub const MAX_PHOTO_BYTES: usize = DEFAULT_MAX_UPLOAD_BYTES;

/// Client-side error.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport or decoding failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with `success: false`.
    #[error("{message} ({status}, {code})")]
    Api {
        /// HTTP status.
        status: u16,
        /// Error kind reported by the server.
        code: String,
        /// Human readable message.
        message: String,
    },

    /// Photo exceeds the upload cap; nothing was sent.
    #[error("Image size must be less than {max} bytes (got {size})")]
    FileTooLarge {
        /// Size of the rejected file.
        size: usize,
        /// Cap.
        max: usize,
    },

    /// Call needs a session; log in first.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Base URL cannot carry path segments.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

/// Client result alias.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterReply {
    inserted_id: String,
}

#[derive(Deserialize)]
struct LoginReply {
    user: PublicUser,
    token: String,
}

#[derive(Deserialize)]
struct BooksReply {
    books: Vec<Book>,
}

#[derive(Deserialize)]
struct ShelvesReply {
    shelves: Shelves,
}

#[derive(Deserialize)]
struct UploadReply {
    url: String,
}

/// API client. Holds the session token after [`BookwormClient::login`].
#[derive(Debug, Clone)]
pub struct BookwormClient {
    base_url: String,
    http: reqwest::Client,
    token: Option<String>,
}

impl BookwormClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            token: None,
        })
    }

    /// Reuse an existing session token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Current session token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL for `path` followed by `segment`, percent-encoded so it stays one segment.
    fn url_with_segment(&self, path: &str, segment: &str) -> ClientResult<Url> {
        let mut url =
            Url::parse(&self.url(path)).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?
            .push(segment);
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> ClientResult<RequestBuilder> {
        let token = self.token.as_deref().ok_or(ClientError::NotLoggedIn)?;
        Ok(request.bearer_auth(token))
    }

    /// Create an account. Returns the new user's ID.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        photo: Option<&str>,
    ) -> ClientResult<String> {
        let response = self
            .http
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "email": email,
                "password": password,
                "name": name,
                "photo": photo,
            }))
            .send()
            .await?;

        let reply: RegisterReply = parse(response).await?;
        Ok(reply.inserted_id)
    }

    /// Log in and keep the session token.
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<PublicUser> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let reply: LoginReply = parse(response).await?;
        self.token = Some(reply.token);
        Ok(reply.user)
    }

    /// End the session.
    pub async fn logout(&mut self) -> ClientResult<()> {
        let request = self.authed(self.http.post(self.url("/api/auth/logout")))?;
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        self.token = None;
        Ok(())
    }

    /// Browse the catalog.
    pub async fn books(&self, query: Option<&str>) -> ClientResult<Vec<Book>> {
        let mut request = self.http.get(self.url("/api/books"));
        if let Some(q) = query {
            request = request.query(&[("q", q)]);
        }

        let reply: BooksReply = parse(request.send().await?).await?;
        Ok(reply.books)
    }

    /// Fetch all shelves.
    pub async fn shelves(&self) -> ClientResult<Shelves> {
        let request = self.authed(self.http.get(self.url("/api/users/shelf")))?;
        let reply: ShelvesReply = parse(request.send().await?).await?;
        Ok(reply.shelves)
    }

    /// Add, move, or update a shelved book.
    pub async fn update_shelf(&self, update: &ShelfUpdate) -> ClientResult<Shelves> {
        let request = self.authed(self.http.post(self.url("/api/users/shelf")))?;
        let reply: ShelvesReply = parse(request.json(update).send().await?).await?;
        Ok(reply.shelves)
    }

    /// Record pages read for a book being read.
    pub async fn update_progress(&self, book_id: &str, progress: i64) -> ClientResult<Shelves> {
        self.update_shelf(&ShelfUpdate {
            book_id: book_id.to_string(),
            shelf: Shelf::CurrentlyReading,
            progress: Some(progress),
            total_pages: None,
        })
        .await
    }

    /// Take a book off the shelves.
    pub async fn remove_from_shelf(&self, book_id: &str) -> ClientResult<Shelves> {
        let url = self.url_with_segment("/api/users/shelf", book_id)?;
        let request = self.authed(self.http.delete(url))?;
        let reply: ShelvesReply = parse(request.send().await?).await?;
        Ok(reply.shelves)
    }

    /// Upload a profile photo. Returns its URL.
    ///
    /// Files over [`MAX_PHOTO_BYTES`] fail with [`ClientError::FileTooLarge`]
    /// without contacting the server.
    pub async fn upload_photo(
        &self,
        file_name: &str,
        mime: &str,
        data: Vec<u8>,
    ) -> ClientResult<String> {
        if data.len() > MAX_PHOTO_BYTES {
            return Err(ClientError::FileTooLarge {
                size: data.len(),
                max: MAX_PHOTO_BYTES,
            });
        }

        let part = multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await?;

        let reply: UploadReply = parse(response).await?;
        Ok(reply.url)
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response.json::<T>().await?)
}

async fn api_error(response: Response) -> ClientError {
    let status = response.status();
    let body = response.json::<ErrorBody>().await.ok();

    let (message, code) = match body {
        Some(body) => (body.error, body.code),
        None => (None, None),
    };

    ClientError::Api {
        status: status.as_u16(),
        code: code.unwrap_or_else(|| "unknown".to_string()),
        message: message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        }),
    }
}
