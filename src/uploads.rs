//! Profile photo uploads stored on local disk.

use crate::config::UploadConfig;
use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Path prefix uploaded files are served under.
pub const UPLOAD_URL_PREFIX: &str = "/uploads";

/// Accepted image types and the extension they are stored with.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
];

/// Extension for an accepted image content type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    IMAGE_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
}

/// Writes uploaded images to a directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    /// Create a store from configuration.
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            max_bytes: config.max_bytes,
        }
    }

    /// Directory files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Size cap in bytes.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Check size and type without touching the disk.
    pub fn check(&self, content_type: Option<&str>, len: usize) -> Result<&'static str> {
        if len == 0 {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }

        if len > self.max_bytes {
            return Err(AppError::PayloadTooLarge {
                max_bytes: self.max_bytes,
            });
        }

        content_type.and_then(extension_for).ok_or_else(|| {
            AppError::Validation(
                "Only JPEG, PNG, GIF, WebP and AVIF images are accepted".to_string(),
            )
        })
    }

    /// Store an image and return the URL it is served at.
    pub async fn save(&self, content_type: Option<&str>, data: &[u8]) -> Result<String> {
        let ext = self.check(content_type, data.len())?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = format!("{}.{}", Uuid::new_v4(), ext);
        tokio::fs::write(self.dir.join(&file_name), data).await?;

        tracing::info!(file = %file_name, bytes = data.len(), "Stored upload");
        Ok(format!("{}/{}", UPLOAD_URL_PREFIX, file_name))
    }
}
