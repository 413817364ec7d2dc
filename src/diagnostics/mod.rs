//! Diagnostics for the window stream.
//!
//! Counters describing what a traversal has read and emitted, shareable with
//! whoever schedules training.

pub mod stats;

// Re-export commonly used types
pub use stats::{create_shared_stats, SharedTraversalStats, TraversalSnapshot, TraversalStats};
