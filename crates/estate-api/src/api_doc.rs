//! OpenAPI documentation.

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers;
use estate_core::models::{PersistedPhoto, SyncFailure, SyncOperation};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Estate Photo API",
        version = "0.1.0",
        description = "Keeps each property's photo set consistent between client edits, the object store and the photo catalog. Versioned endpoints live under /api/v0/."
    ),
    paths(
        handlers::photos::sync_photos,
        handlers::photos::list_photos,
        handlers::health::liveness_check,
        handlers::health::readiness_check,
    ),
    components(schemas(
        handlers::photos::SyncResponse,
        handlers::photos::PhotoListResponse,
        handlers::health::HealthResponse,
        PersistedPhoto,
        SyncFailure,
        SyncOperation,
        ErrorResponse,
    )),
    tags(
        (name = "photos", description = "Property photo synchronization"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;
