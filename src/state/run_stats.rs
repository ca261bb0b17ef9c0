use crate::state::CrawlPhase;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a row was skipped before any click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Hidden-row class, zero height, display-none, or scroll-helper id
    SystemRow,
    NotVisible,
    TooFewCells,
    EmptyText,
    EmptyIdentifier,
    /// The row vanished or could not be queried
    Unreadable,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemRow => "system_row",
            Self::NotVisible => "not_visible",
            Self::TooFewCells => "too_few_cells",
            Self::EmptyText => "empty_text",
            Self::EmptyIdentifier => "empty_identifier",
            Self::Unreadable => "unreadable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rung of the return-to-list ladder brought the list view back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryRung {
    ListButton,
    HistoryBack,
    Soft,
    Hard,
    /// Every rung failed; the current page was abandoned
    Exhausted,
}

impl RecoveryRung {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListButton => "list_button",
            Self::HistoryBack => "history_back",
            Self::Soft => "soft",
            Self::Hard => "hard",
            Self::Exhausted => "exhausted",
        }
    }

    pub fn all() -> [RecoveryRung; 5] {
        [
            Self::ListButton,
            Self::HistoryBack,
            Self::Soft,
            Self::Hard,
            Self::Exhausted,
        ]
    }
}

impl fmt::Display for RecoveryRung {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters collected over one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    pub rows_seen: u64,
    pub rows_rejected: IndexMap<RejectReason, u64>,
    pub duplicates_skipped: u64,
    pub records_committed: u64,
    pub extraction_failures: u64,
    /// Row clicks that needed the forced last-resort click
    pub forced_clicks: u64,

    pub recoveries: IndexMap<RecoveryRung, u64>,
    pub pages_visited: u32,
    /// Pagination strategy that reached each page, in order
    pub pagination_log: Vec<(u32, String)>,

    pub terminal_phase: Option<CrawlPhase>,
    pub terminal_error: Option<String>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rejection(&mut self, reason: RejectReason) {
        *self.rows_rejected.entry(reason).or_insert(0) += 1;
    }

    pub fn record_recovery(&mut self, rung: RecoveryRung) {
        *self.recoveries.entry(rung).or_insert(0) += 1;
    }

    pub fn record_pagination(&mut self, page: u32, strategy: impl Into<String>) {
        self.pagination_log.push((page, strategy.into()));
    }

    pub fn total_rejected(&self) -> u64 {
        self.rows_rejected.values().sum()
    }

    pub fn recoveries_for(&self, rung: RecoveryRung) -> u64 {
        self.recoveries.get(&rung).copied().unwrap_or(0)
    }

    /// Wall time between start and finish, if both are known
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
