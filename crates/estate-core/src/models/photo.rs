use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::multipart::RawPart;
use crate::validation::uploaded_at_from_key;

/// Form field carrying the keys the client wants to keep.
pub const EXISTING_PHOTOS_FIELD: &str = "existingPhotos";
/// Form field carrying the keys the client wants removed.
pub const PHOTOS_TO_DELETE_FIELD: &str = "photosToDelete";
/// Form field for new photo files.
pub const FILES_FIELD: &str = "files";

/// Kind of object-store operation a sync failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Upload,
    Delete,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOperation::Upload => write!(f, "upload"),
            SyncOperation::Delete => write!(f, "delete"),
        }
    }
}

/// One failed upload or delete. For uploads `key` is the submitted file
/// name, since no object key exists yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncFailure {
    pub operation: SyncOperation,
    pub key: String,
    pub reason: String,
}

/// Outcome of one synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// The photo list as written to the catalog.
    pub final_photo_keys: Vec<String>,
    pub uploaded: usize,
    pub deleted: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A photo with a durable object key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistedPhoto {
    pub key: String,
    pub url: String,
    pub file_name: String,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl PersistedPhoto {
    /// Derive the display fields from the key. Keys not produced by this
    /// service keep their last path segment as file name and have no upload time.
    pub fn from_key(key: impl Into<String>, url: impl Into<String>) -> Self {
        let key = key.into();
        let uploaded_at = uploaded_at_from_key(&key);
        let last = key.rsplit('/').next().unwrap_or(&key);
        let file_name = if uploaded_at.is_some() {
            // {millis}-{token}-{name}
            last.splitn(3, '-').nth(2).unwrap_or(last).to_string()
        } else {
            last.to_string()
        };

        PersistedPhoto {
            key,
            url: url.into(),
            file_name,
            uploaded_at,
        }
    }
}

/// A photo received from the client that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPhoto {
    pub file_name: String,
    pub content_type: String,
    pub payload: Bytes,
}

impl From<RawPart> for PendingPhoto {
    fn from(part: RawPart) -> Self {
        PendingPhoto {
            file_name: part.file_name.unwrap_or_default(),
            content_type: part.content_type,
            payload: part.payload,
        }
    }
}

/// A photo is either stored under a key or still carries its bytes, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoRef {
    Persisted(PersistedPhoto),
    Pending(PendingPhoto),
}

impl PhotoRef {
    pub fn key(&self) -> Option<&str> {
        match self {
            PhotoRef::Persisted(photo) => Some(&photo.key),
            PhotoRef::Pending(_) => None,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            PhotoRef::Persisted(photo) => &photo.file_name,
            PhotoRef::Pending(photo) => &photo.file_name,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, PhotoRef::Persisted(_))
    }
}

/// Input of one synchronization for a single entity.
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub entity_id: String,
    /// Keys to keep, in display order. Duplicates collapse.
    pub existing_photo_keys: Vec<String>,
    /// Keys to remove. Wins over `existing_photo_keys`.
    pub deleted_photo_keys: Vec<String>,
    pub new_files: Vec<PendingPhoto>,
}

/// Clients may send plain keys or the photo objects they were given.
#[derive(Deserialize)]
#[serde(untagged)]
enum KeyEntry {
    Key(String),
    Photo { key: String },
}

fn parse_key_list(field: &str, raw: &str) -> Result<Vec<String>, AppError> {
    let entries: Vec<KeyEntry> = serde_json::from_str(raw).map_err(|e| {
        AppError::InvalidInput(format!("{} must be a JSON array of photo keys: {}", field, e))
    })?;

    entries
        .into_iter()
        .map(|entry| {
            let key = match entry {
                KeyEntry::Key(key) => key,
                KeyEntry::Photo { key } => key,
            };
            let key = key.trim().to_string();
            if key.is_empty() {
                Err(AppError::InvalidInput(format!(
                    "{} contains an empty photo key",
                    field
                )))
            } else {
                Ok(key)
            }
        })
        .collect()
}

impl SyncRequest {
    /// Classify decoded form parts into a request.
    ///
    /// `existingPhotos` is required (an empty array is fine), `photosToDelete`
    /// is optional, every `files` part with a filename becomes a pending
    /// photo and anything else is ignored.
    pub fn from_form_parts(
        entity_id: impl Into<String>,
        parts: Vec<RawPart>,
    ) -> Result<Self, AppError> {
        let mut existing = None;
        let mut deleted = None;
        let mut new_files = Vec::new();

        for part in parts {
            match part.field_name.as_str() {
                EXISTING_PHOTOS_FIELD if !part.is_file() && existing.is_none() => {
                    existing = Some(parse_key_list(EXISTING_PHOTOS_FIELD, &part.text())?);
                }
                PHOTOS_TO_DELETE_FIELD if !part.is_file() && deleted.is_none() => {
                    deleted = Some(parse_key_list(PHOTOS_TO_DELETE_FIELD, &part.text())?);
                }
                FILES_FIELD if part.is_file() => new_files.push(PendingPhoto::from(part)),
                _ => {}
            }
        }

        let existing_photo_keys = existing.ok_or_else(|| {
            AppError::InvalidInput(format!("Missing required field '{}'", EXISTING_PHOTOS_FIELD))
        })?;

        Ok(SyncRequest {
            entity_id: entity_id.into(),
            existing_photo_keys,
            deleted_photo_keys: deleted.unwrap_or_default(),
            new_files,
        })
    }
}
