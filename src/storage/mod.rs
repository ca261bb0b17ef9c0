//! Storage module for persisting crawl progress
//!
//! This module handles everything the crawl writes while it runs:
//! - The visited identifier set that makes reruns skip collected records
//! - The JSON snapshot of every record collected so far
//!
//! Both files are replaced atomically so a killed process never leaves them
//! half written.

mod json;
mod traits;

pub use json::{load_snapshot, write_atomic, JsonVisitedStore, SnapshotWriter};
pub use traits::{StorageError, StorageResult, VisitedStore};
