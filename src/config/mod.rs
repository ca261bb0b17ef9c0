//! Configuration module for Nuri-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every site selector has a default matching the procurement portal, so a
//! minimal file only needs `[crawler] entry-url`.
//!
//! # Example
//!
//! ```no_run
//! use nuri_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Duplicate ceiling: {}", config.crawler.max_duplicates);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{BrowserConfig, Config, CrawlerConfig, MenuStep, OutputConfig, SiteProfile};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
