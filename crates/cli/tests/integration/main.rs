//! CLI integration tests for mkfetch.

mod cache_tests;
mod common;
mod expand_tests;
mod resolve_tests;
mod run_tests;
