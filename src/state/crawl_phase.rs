/// Named phases of the crawl state machine
///
/// This module defines every state the orchestrator can be in during a run.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current phase of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlPhase {
    // ===== Active Phases =====
    /// Opening the entry page, dismissing overlays, walking the menu
    Bootstrapping,

    /// Triggering the list query and waiting for rows
    Searching,

    /// Resolving the row collection of the current page
    Paging,

    /// Processing rows of the current page
    RowLoop,

    // ===== Terminal Phases =====
    /// The crawl finished (list exhausted, duplicate ceiling, target, or time budget)
    Done,

    /// The list view could never be verified
    Failed,
}

impl CrawlPhase {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if this phase ended the run unsuccessfully
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;
        match (self, next) {
            (Bootstrapping, Searching) | (Bootstrapping, Failed) => true,
            (Searching, Paging) | (Searching, Failed) => true,
            (Paging, RowLoop) | (Paging, Done) => true,
            // page exhausted: next page, or the list ended
            (RowLoop, Paging) | (RowLoop, Done) => true,
            // hard recovery re-runs the bootstrap sequence
            (RowLoop, Bootstrapping) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bootstrapping => "bootstrapping",
            Self::Searching => "searching",
            Self::Paging => "paging",
            Self::RowLoop => "row_loop",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "bootstrapping" => Some(Self::Bootstrapping),
            "searching" => Some(Self::Searching),
            "paging" => Some(Self::Paging),
            "row_loop" => Some(Self::RowLoop),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all phases
    pub fn all_phases() -> Vec<Self> {
        vec![
            Self::Bootstrapping,
            Self::Searching,
            Self::Paging,
            Self::RowLoop,
            Self::Done,
            Self::Failed,
        ]
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
