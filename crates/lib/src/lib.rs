//! mkfetch-lib: remote Makefile resolution and caching
//!
//! This crate turns Makefile references into local files:
//! - `reference`: classify a raw string as a local path, HTTP URL or OCI artifact
//! - `transport`: fetch remote artifacts over HTTP or from an OCI registry
//! - `cache`: content-addressed blob store with symlinked tag pointers
//! - `resolve`: cache-first resolution of any reference to a local path
//! - `expand`: recursive `include` flattening with cycle detection

pub mod cache;
pub mod config;
pub mod consts;
pub mod expand;
pub mod platform;
pub mod reference;
pub mod resolve;
pub mod transport;
pub mod util;
