//! Property photo endpoints.

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use bytes::Bytes;
use estate_core::models::{PersistedPhoto, SyncFailure, SyncRequest};
use estate_core::multipart;
use estate_core::validation::validate_entity_id;
use estate_core::AppError;
use estate_storage::Storage;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Outcome of one photo synchronization.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    /// True when every requested operation succeeded.
    pub success: bool,
    pub uploaded: usize,
    pub deleted: usize,
    /// Number of photos now listed for the property.
    pub total: usize,
    pub failures: Vec<SyncFailure>,
    pub photos: Vec<PersistedPhoto>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhotoListResponse {
    pub entity_id: String,
    pub total: usize,
    pub photos: Vec<PersistedPhoto>,
}

fn persisted_photos(storage: &dyn Storage, keys: &[String]) -> Vec<PersistedPhoto> {
    keys.iter()
        .map(|key| PersistedPhoto::from_key(key.as_str(), storage.public_url(key)))
        .collect()
}

#[utoipa::path(
    post,
    path = "/api/v0/properties/{entity_id}/photos",
    tag = "photos",
    params(
        ("entity_id" = String, Path, description = "Property identifier")
    ),
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "Fields `existingPhotos` (JSON array of keys to keep), optional `photosToDelete` (JSON array of keys to remove) and any number of `files` parts"
    ),
    responses(
        (status = 200, description = "Synchronization finished; check `failures` for per-photo errors", body = SyncResponse),
        (status = 400, description = "Malformed multipart body or form fields", body = ErrorResponse),
        (status = 413, description = "Request body too large"),
        (status = 500, description = "Catalog could not be read or written", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip_all, fields(entity_id = %entity_id, body_bytes = body.len()))]
pub async fn sync_photos(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SyncResponse>, HttpAppError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let boundary = multipart::extract_boundary(content_type).ok_or_else(|| {
        AppError::BadRequest("Expected multipart/form-data with a boundary".to_string())
    })?;

    let parts = multipart::parse(&body, &boundary);
    if parts.is_empty() {
        return Err(AppError::BadRequest("Request body contains no form parts".to_string()).into());
    }
    tracing::debug!(parts = parts.len(), "Multipart body parsed");

    let request = SyncRequest::from_form_parts(entity_id.as_str(), parts)?;

    let result = {
        let _guard = state.locks.acquire(&entity_id).await;
        state.engine.synchronize(request).await?
    };

    Ok(Json(SyncResponse {
        success: result.is_complete(),
        uploaded: result.uploaded,
        deleted: result.deleted,
        total: result.final_photo_keys.len(),
        photos: persisted_photos(state.storage(), &result.final_photo_keys),
        failures: result.failures,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v0/properties/{entity_id}/photos",
    tag = "photos",
    params(
        ("entity_id" = String, Path, description = "Property identifier")
    ),
    responses(
        (status = 200, description = "Photos currently listed for the property", body = PhotoListResponse),
        (status = 400, description = "Invalid property identifier", body = ErrorResponse),
        (status = 500, description = "Catalog could not be read", body = ErrorResponse)
    )
)]
pub async fn list_photos(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<PhotoListResponse>, HttpAppError> {
    validate_entity_id(&entity_id)?;

    let keys = state
        .catalog()
        .get_photo_keys(&entity_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, entity_id = %entity_id, "Failed to read photo catalog");
            AppError::Catalog(e.to_string())
        })?;

    Ok(Json(PhotoListResponse {
        total: keys.len(),
        photos: persisted_photos(state.storage(), &keys),
        entity_id,
    }))
}
