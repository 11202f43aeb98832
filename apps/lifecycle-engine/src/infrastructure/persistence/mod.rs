//! State persistence adapters.

mod file_store;
pub mod git_sync;
mod in_memory;

pub use file_store::JsonFileStatePersistence;
pub use git_sync::{GitStateSync, GitSyncSettings};
pub use in_memory::InMemoryStatePersistence;
