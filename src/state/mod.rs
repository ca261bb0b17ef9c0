//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: the named phases of the orchestrator state machine
//! - `CrawlCursor`: page number, row index, and duplicate streak
//! - `RunStats`: counters reported in the run summary

mod crawl_phase;
mod cursor;
mod run_stats;

// Re-export main types
pub use crawl_phase::CrawlPhase;
pub use cursor::CrawlCursor;
pub use run_stats::{RecoveryRung, RejectReason, RunStats};
