//! Entity ids and object keys for property photos.
//!
//! Keys have the shape `{prefix}/{entity_id}/{unix_millis}-{token}-{file_name}`.
//! The millisecond timestamp doubles as the photo's upload time.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::AppError;

pub const MAX_ENTITY_ID_LENGTH: usize = 128;
pub const MAX_FILE_NAME_LENGTH: usize = 100;

/// Entity ids become a path segment, so only a conservative alphabet is accepted.
pub fn validate_entity_id(entity_id: &str) -> Result<(), AppError> {
    if entity_id.is_empty() {
        return Err(AppError::InvalidInput("Entity id cannot be empty".to_string()));
    }
    if entity_id.len() > MAX_ENTITY_ID_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "Entity id exceeds maximum length of {} characters",
            MAX_ENTITY_ID_LENGTH
        )));
    }
    if entity_id == "." || entity_id == ".." {
        return Err(AppError::InvalidInput(format!(
            "Entity id '{}' is not allowed",
            entity_id
        )));
    }
    if !entity_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(AppError::InvalidInput(format!(
            "Entity id '{}' contains invalid characters. Only alphanumeric characters, hyphens, underscores and dots are allowed",
            entity_id
        )));
    }
    Ok(())
}

/// Reduce a client-supplied file name to a safe key segment.
///
/// Directory components are dropped, anything outside `[A-Za-z0-9._-]`
/// becomes `-`, runs of `-` collapse, and the result is capped at
/// `MAX_FILE_NAME_LENGTH` bytes while keeping the extension.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);

    let mut sanitized = String::with_capacity(base.len());
    for c in base.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            c
        } else {
            '-'
        };
        if c == '-' && sanitized.ends_with('-') {
            continue;
        }
        sanitized.push(c);
    }

    let trimmed = sanitized.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        return "photo".to_string();
    }

    if trimmed.len() <= MAX_FILE_NAME_LENGTH {
        return trimmed.to_string();
    }

    // ASCII only from here, so byte slicing is safe.
    match trimmed.rfind('.') {
        Some(dot) if trimmed.len() - dot <= 10 => {
            let ext = &trimmed[dot..];
            format!("{}{}", &trimmed[..MAX_FILE_NAME_LENGTH - ext.len()], ext)
        }
        _ => trimmed[..MAX_FILE_NAME_LENGTH].to_string(),
    }
}

/// `{prefix}/{entity_id}/`, the namespace holding one entity's photos.
pub fn entity_key_prefix(prefix: &str, entity_id: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/", entity_id)
    } else {
        format!("{}/{}/", prefix, entity_id)
    }
}

pub fn build_photo_key(
    prefix: &str,
    entity_id: &str,
    uploaded_at: DateTime<Utc>,
    token: &str,
    file_name: &str,
) -> String {
    format!(
        "{}{}-{}-{}",
        entity_key_prefix(prefix, entity_id),
        uploaded_at.timestamp_millis(),
        token,
        sanitize_file_name(file_name)
    )
}

/// Recover the upload time encoded in a key built by [`build_photo_key`].
/// Keys from elsewhere yield `None`.
pub fn uploaded_at_from_key(key: &str) -> Option<DateTime<Utc>> {
    let name = key.rsplit('/').next()?;
    let (millis, _) = name.split_once('-')?;
    if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let millis: i64 = millis.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}
