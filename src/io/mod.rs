//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `serial` - Rangefinder serial reader (the background reader loop)
//! - `http` - Query endpoint, dashboard and metrics over HTTP

pub mod http;
pub mod serial;

// Re-export commonly used types
pub use http::{start_http_server, AppState};
pub use serial::{LineOutcome, SerialReader, StreamEnd};
