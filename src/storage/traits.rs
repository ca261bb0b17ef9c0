//! Storage traits and error types
//!
//! This module defines the trait interface for the visited-set backend and
//! associated error types.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt store at {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable set of identifiers whose records were already collected
///
/// An identifier is marked exactly when its record is appended to the result
/// collection. `flush` must leave the durable copy readable at every instant.
pub trait VisitedStore {
    /// Loads the durable set into memory
    ///
    /// A missing or unreadable store yields an empty set; this never fails.
    fn load(&mut self);

    fn is_visited(&self, id: &str) -> bool;

    /// Adds `id` to the in-memory set; returns false if it was already present
    fn mark_visited(&mut self, id: &str) -> bool;

    /// Overwrites the durable copy from the in-memory set
    fn flush(&self) -> StorageResult<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every identifier, sorted
    fn ids(&self) -> Vec<String>;
}
