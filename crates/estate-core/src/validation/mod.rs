//! Validation modules

pub mod photo_key;

pub use photo_key::{
    build_photo_key, entity_key_prefix, sanitize_file_name, uploaded_at_from_key,
    validate_entity_id, MAX_ENTITY_ID_LENGTH, MAX_FILE_NAME_LENGTH,
};
