//! Services - shared state between the reader loop and request handlers
//!
//! - `store` - Lock-guarded latest-snapshot store

pub mod store;

// Re-export commonly used types
pub use store::SnapshotStore;
