//! Blob storage for build artifacts.
//!
//! [`ArtifactStore`] owns the path layout and the legacy fallback, the
//! [`Backend`] implementations only move bytes around.

mod artifact;
mod backend;
mod local;
mod memory;

pub use artifact::ArtifactStore;
pub use backend::{Backend, StorageError, StorageResult};
pub use local::LocalStorage;
pub use memory::MemoryStorage;
