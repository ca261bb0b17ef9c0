//! Output exporter traits and types
//!
//! This module defines the exporter interface shared by the CSV and workbook
//! writers, and the summary structure rendered at the end of a run.

use crate::model::ResultCollection;
use crate::state::{CrawlPhase, RecoveryRung, RunStats};
use indexmap::IndexMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

impl From<crate::storage::StorageError> for OutputError {
    fn from(e: crate::storage::StorageError) -> Self {
        OutputError::Write(e.to_string())
    }
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Summary of one harvest run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    // Run metadata
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub terminal_phase: Option<CrawlPhase>,
    pub terminal_error: Option<String>,
    pub config_hash: String,

    // Row accounting
    pub records_collected: u64,
    pub rows_seen: u64,
    pub duplicates_skipped: u64,
    pub extraction_failures: u64,
    pub forced_clicks: u64,
    pub rows_rejected: IndexMap<String, u64>,

    // Navigation
    pub recoveries: IndexMap<RecoveryRung, u64>,
    pub pages_visited: u32,
    pub pagination_log: Vec<(u32, String)>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a summary from a run's counters
    ///
    /// `records_collected` is taken from the result collection rather than
    /// the counters, so a summary regenerated from a snapshot still reports
    /// what was actually written.
    pub fn from_stats(stats: &RunStats, results: &ResultCollection, config_hash: &str) -> Self {
        let mut recoveries = IndexMap::new();
        for rung in RecoveryRung::all() {
            recoveries.insert(rung, stats.recoveries_for(rung));
        }

        Self {
            started_at: stats.started_at.map(|t| t.to_rfc3339()),
            finished_at: stats.finished_at.map(|t| t.to_rfc3339()),
            duration_seconds: stats
                .duration()
                .map(|d| d.num_seconds().max(0) as u64),
            terminal_phase: stats.terminal_phase,
            terminal_error: stats.terminal_error.clone(),
            config_hash: config_hash.to_string(),
            records_collected: results.len() as u64,
            rows_seen: stats.rows_seen,
            duplicates_skipped: stats.duplicates_skipped,
            extraction_failures: stats.extraction_failures,
            forced_clicks: stats.forced_clicks,
            rows_rejected: stats
                .rows_rejected
                .iter()
                .map(|(reason, count)| (reason.as_str().to_string(), *count))
                .collect(),
            recoveries,
            pages_visited: stats.pages_visited,
            pagination_log: stats.pagination_log.clone(),
        }
    }

    pub fn total_rejected(&self) -> u64 {
        self.rows_rejected.values().sum()
    }

    pub fn total_recoveries(&self) -> u64 {
        self.recoveries.values().sum()
    }

    /// Share of seen rows that ended up as records, as a percentage
    pub fn yield_rate(&self) -> f64 {
        if self.rows_seen == 0 {
            return 0.0;
        }
        (self.records_collected as f64 / self.rows_seen as f64) * 100.0
    }
}

/// Trait for result exporters
///
/// An exporter turns the in-memory result collection into files once the
/// run has ended.
pub trait Exporter {
    /// Writes `results` and returns every file it produced
    ///
    /// # Arguments
    ///
    /// * `results` - The records collected so far, in commit order
    fn export(&self, results: &ResultCollection) -> OutputResult<Vec<PathBuf>>;

    /// Short name used in log lines
    fn name(&self) -> &'static str;
}
