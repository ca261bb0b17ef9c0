use serde::{Deserialize, Serialize};

/// Position of the orchestrator inside the paginated list
///
/// The cursor is the only place the page number and row index live, so every
/// reset rule is enforced here:
/// - `row_index_on_page` goes back to 0 on every page transition
/// - `page_number` goes back to 1 only on a hard recovery
/// - `consecutive_duplicate_count` goes back to 0 when a fresh row is seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCursor {
    page_number: u32,
    row_index_on_page: usize,
    consecutive_duplicate_count: u32,
}

impl CrawlCursor {
    pub fn new() -> Self {
        Self {
            page_number: 1,
            row_index_on_page: 0,
            consecutive_duplicate_count: 0,
        }
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn row_index_on_page(&self) -> usize {
        self.row_index_on_page
    }

    pub fn consecutive_duplicate_count(&self) -> u32 {
        self.consecutive_duplicate_count
    }

    /// Moves to the row at `index` on the current page
    pub fn set_row(&mut self, index: usize) {
        self.row_index_on_page = index;
    }

    /// Advances to the following page after a successful pagination click
    pub fn next_page(&mut self) {
        self.page_number += 1;
        self.row_index_on_page = 0;
    }

    /// Rewinds to the first page after the list was rebuilt from scratch
    pub fn hard_reset(&mut self) {
        self.page_number = 1;
        self.row_index_on_page = 0;
    }

    /// Counts one more already-visited row and returns the new streak length
    pub fn record_duplicate(&mut self) -> u32 {
        self.consecutive_duplicate_count += 1;
        self.consecutive_duplicate_count
    }

    /// Breaks the duplicate streak
    pub fn reset_duplicates(&mut self) {
        self.consecutive_duplicate_count = 0;
    }
}

impl Default for CrawlCursor {
    fn default() -> Self {
        Self::new()
    }
}
