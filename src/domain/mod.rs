//! Domain models - line protocol, slot classification and shared types
//!
//! This module contains the pure, I/O-free core:
//! - `protocol` - `D:` line decoding and sample parsing
//! - `classifier` - per-slot occupancy rule
//! - `types` - `Snapshot`, `OccupancyState`, `SlotId`

pub mod classifier;
pub mod protocol;
pub mod types;

// Re-export commonly used types at module level
pub use classifier::Classifier;
pub use protocol::{LineError, ShapeError};
pub use types::{OccupancyState, SlotId, Snapshot};
