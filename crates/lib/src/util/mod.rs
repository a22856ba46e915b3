//! Shared utilities.
//!
//! Content digests and atomic file writes used by the cache and the expander.

pub mod fs;
pub mod hash;
