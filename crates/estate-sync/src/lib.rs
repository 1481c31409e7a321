//! Estate Sync Library
//!
//! `PhotoSyncEngine` reconciles a property's photo set between the client's
//! declared state, the object store and the catalog. `MaintenanceSweeper`
//! applies one object operation to every key under a prefix. Both isolate
//! failures per object and report them as data.

pub mod engine;
pub mod error;
pub mod sweep;

#[cfg(test)]
mod test_helpers;

pub use engine::{PhotoSyncEngine, SyncSettings};
pub use error::SyncError;
pub use sweep::{MaintenanceSweeper, SweepSettings};
