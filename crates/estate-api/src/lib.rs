//! Estate API Library
//!
//! HTTP boundary of the property-photo service: handlers, error responses,
//! per-entity serialization and application setup.

mod api_doc;
pub mod constants;
pub mod error;
mod handlers;
pub mod locks;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use api_doc::ApiDoc;
pub use error::{ErrorResponse, HttpAppError};
pub use locks::EntityLocks;
pub use state::AppState;
