//! Shared key validation for storage backends.

use crate::{StorageError, StorageResult};

/// Hard upper bound on keys returned by one `list` call (the S3 server cap).
pub const MAX_PAGE_SIZE: usize = 1000;

const MAX_KEY_LENGTH: usize = 1024;

/// Reject keys that could escape a backend's namespace.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StorageError::InvalidKey(format!(
            "Storage key exceeds {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|segment| segment == "..")
    {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Clamp a configured page size into `1..=MAX_PAGE_SIZE`.
pub fn clamp_page_size(page_size: usize) -> usize {
    page_size.clamp(1, MAX_PAGE_SIZE)
}
