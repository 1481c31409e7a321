//! Data models for the application
//!
//! Photo sync inputs and outputs plus the maintenance sweep report.

mod photo;
mod sweep;

// Re-export all models for convenient imports
pub use photo::*;
pub use sweep::*;
