//! Utils Module - shared infrastructure
//!
//! Caching, scan serialization, failure memory, telemetry and constants.

pub mod cache;
pub mod constants;
pub mod failure_tracker;
pub mod scan_mutex;
pub mod telemetry;

pub use cache::*;
pub use constants::*;
pub use failure_tracker::*;
pub use scan_mutex::*;
pub use telemetry::*;
