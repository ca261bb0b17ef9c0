//! Nuri-Harvest: a resumable bid-announcement harvester
//!
//! This crate drives a browser session through a multi-frame procurement
//! portal, walks the announcement list row by row, extracts every detail page
//! into a structured [`model::Record`], and persists progress incrementally so
//! an interrupted run can be resumed without reprocessing collected records.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Nuri-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser driver error: {0}")]
    Driver(#[from] browser::DriverError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Extractor error: {0}")]
    Extract(#[from] crawler::ExtractError),

    #[error("List view could not be verified after {attempts} attempts")]
    Bootstrap { attempts: u32 },

    #[error("Search control on the list view could not be clicked")]
    Search,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Nuri-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Orchestrator;
pub use model::{FieldValue, Record, ResultCollection, TabularDataset};
pub use state::{CrawlCursor, CrawlPhase};
