//! Integration tests for Nuri-Harvest
//!
//! The crawl is exercised end to end against an in-memory portal that
//! implements the browser driver interface.

mod crawl_tests;
mod portal;
