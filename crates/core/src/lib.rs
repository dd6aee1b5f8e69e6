//! Core data model for Lookout
//!
//! This crate provides:
//! - The snapshot tree used to remember what a watched root looked like
//! - BLAKE3 content digests for timestamp-ambiguous comparisons
//! - Monotonic timestamps for timeouts and debounce windows

pub mod hash;
pub mod time;
pub mod tree;

// Re-exports
pub use hash::ContentHash;
pub use time::MonotonicTime;
pub use tree::{DirNode, FileMeta, Node, RelPath, Tree};
