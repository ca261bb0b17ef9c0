//! Crawl orchestrator - main crawl state machine
//!
//! This module ties every other piece together:
//! - Bootstrapping the list view and triggering the search
//! - Walking the rows of each page and opening their detail views
//! - Committing extracted records with incremental persistence
//! - Recovering the list view after every row
//! - Advancing pagination and deciding when to stop

use crate::browser::wait::wait_for_text;
use crate::browser::{ClickMode, Driver, ElementHandle};
use crate::config::Config;
use crate::crawler::extractor::RecordExtractor;
use crate::crawler::locator::ContentSurface;
use crate::crawler::navigator::Navigator;
use crate::crawler::pagination::{go_to_page, visible_page_labels};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::rows::{link_target, resolve_rows, RowFacts, RowSet};
use crate::model::{Record, ResultCollection};
use crate::state::{CrawlCursor, CrawlPhase, RecoveryRung, RejectReason, RunStats};
use crate::storage::{write_atomic, SnapshotWriter, VisitedStore};
use crate::HarvestError;
use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Best-effort budget for scrolling a row target into view
const SCROLL_TIMEOUT: Duration = Duration::from_secs(3);
/// Pause after the detail marker appears, letting the rest of the form render
const DETAIL_SETTLE: Duration = Duration::from_secs(1);

/// How a page's row loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageOutcome {
    /// Every row was handled; move on to the next page
    Finished,
    /// The list view was lost for good; try paginating anyway
    Abandoned,
    /// Hard recovery rebuilt the list on its first page
    Restarted,
    /// The list was reloaded and could only be walked back to the cursor's
    /// current page, which must be processed from its first row
    Reloaded,
    /// Duplicate ceiling, target count, or time budget reached
    Stop,
}

/// Main crawl orchestrator
///
/// Owns the browser driver, the visited set, and every record collected in
/// this run. [`run`](Self::run) never fails: whatever happens, it persists and
/// returns what was collected.
pub struct Orchestrator<D: Driver> {
    driver: D,
    config: Config,
    navigator: Navigator,
    extractor: RecordExtractor,
    retry: RetryPolicy,
    visited: Box<dyn VisitedStore + Send>,
    snapshot: SnapshotWriter,
    results: ResultCollection,
    cursor: CrawlCursor,
    phase: CrawlPhase,
    stats: RunStats,
    deadline: Option<Instant>,
}

impl<D: Driver> Orchestrator<D> {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    ///
    /// * `driver` - The browser session to drive
    /// * `config` - The validated configuration
    /// * `visited` - The visited set; it is loaded when the run starts
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to run
    /// * `Err(HarvestError)` - A detail page selector does not compile
    pub fn new(
        driver: D,
        config: Config,
        visited: impl VisitedStore + Send + 'static,
    ) -> Result<Self, HarvestError> {
        let extractor = RecordExtractor::new(&config.site)?;
        Ok(Self {
            navigator: Navigator::new(&config),
            retry: RetryPolicy::from_config(&config.crawler),
            snapshot: SnapshotWriter::new(&config.output.snapshot_path),
            driver,
            extractor,
            visited: Box::new(visited),
            results: ResultCollection::new(),
            cursor: CrawlCursor::new(),
            phase: CrawlPhase::Bootstrapping,
            stats: RunStats::new(),
            deadline: None,
            config,
        })
    }

    pub fn results(&self) -> &ResultCollection {
        &self.results
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn cursor(&self) -> &CrawlCursor {
        &self.cursor
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn visited(&self) -> &dyn VisitedStore {
        self.visited.as_ref()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Runs the crawl to completion and returns every record collected
    pub async fn run(&mut self) -> ResultCollection {
        self.stats.started_at = Some(Utc::now());
        self.visited.load();
        self.deadline = self
            .config
            .crawler
            .max_run_minutes
            .map(|minutes| Instant::now() + Duration::from_secs(minutes * 60));

        tracing::info!(
            visited = self.visited.len(),
            target = ?self.config.crawler.target_count,
            "Starting crawl"
        );

        let terminal = self.crawl().await;
        self.transition(terminal);
        self.finish();

        self.results.clone()
    }

    fn transition(&mut self, next: CrawlPhase) {
        if self.phase == next {
            return;
        }
        if !self.phase.can_transition_to(next) {
            tracing::warn!(from = %self.phase, to = %next, "Unexpected phase transition");
        }
        tracing::debug!(from = %self.phase, to = %next, "Phase transition");
        self.phase = next;
    }

    /// Persists final state; storage failures are logged, never raised
    fn finish(&mut self) {
        if let Err(e) = self.visited.flush() {
            tracing::error!("Failed to save visited set: {}", e);
        }
        if let Err(e) = self.snapshot.write(&self.results) {
            tracing::error!("Failed to save snapshot: {}", e);
        }

        self.stats.finished_at = Some(Utc::now());
        self.stats.terminal_phase = Some(self.phase);

        match self.phase {
            CrawlPhase::Failed => tracing::error!(
                error = self.stats.terminal_error.as_deref().unwrap_or("unknown"),
                records = self.results.len(),
                "Crawl failed"
            ),
            _ => tracing::info!(
                records = self.results.len(),
                pages = self.stats.pages_visited,
                "Crawl finished"
            ),
        }
    }

    fn target_reached(&self) -> bool {
        self.config
            .crawler
            .target_count
            .is_some_and(|target| self.results.len() >= target)
    }

    fn time_exhausted(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The state machine proper; returns the terminal phase
    async fn crawl(&mut self) -> CrawlPhase {
        let Some(mut surface) = self.bootstrap().await else {
            return CrawlPhase::Failed;
        };

        self.transition(CrawlPhase::Searching);
        if !self.navigator.search(&self.driver, &surface.frame).await {
            let err = HarvestError::Search;
            tracing::error!("Initial search failed: {}", err);
            self.stats.terminal_error = Some(err.to_string());
            return CrawlPhase::Failed;
        }

        loop {
            self.transition(CrawlPhase::Paging);

            if self.time_exhausted() {
                tracing::info!("Run time budget exhausted");
                return CrawlPhase::Done;
            }

            let page = self.cursor.page_number();
            tracing::info!(page, "Processing page");

            if self.driver.frame_url(&surface.frame).await.is_err() {
                match self.navigator.locator().locate(&self.driver).await {
                    Some(found) => surface = found,
                    None => {
                        tracing::error!(page, "Content frame not found, stopping");
                        return CrawlPhase::Done;
                    }
                }
            }

            let Some(rows) = resolve_rows(&self.driver, &surface.frame, &self.config.site).await else {
                tracing::warn!(page, "No rows found, stopping");
                return CrawlPhase::Done;
            };
            self.stats.pages_visited += 1;

            self.transition(CrawlPhase::RowLoop);
            match self.process_page(&mut surface, rows).await {
                PageOutcome::Stop => return CrawlPhase::Done,
                PageOutcome::Restarted => {
                    tracing::warn!(from_page = page, "Hard recovery reset pagination to page 1");
                    self.cursor.hard_reset();
                    self.transition(CrawlPhase::Bootstrapping);
                    self.transition(CrawlPhase::Searching);
                    continue;
                }
                PageOutcome::Reloaded => {
                    tracing::warn!(
                        from_page = page,
                        page = self.cursor.page_number(),
                        "List reloaded short of the current page, continuing from there"
                    );
                    continue;
                }
                PageOutcome::Finished | PageOutcome::Abandoned => {}
            }

            if self.target_reached() {
                tracing::info!(records = self.results.len(), "Reached target count");
                return CrawlPhase::Done;
            }

            if !self.advance_page(&mut surface).await {
                tracing::info!("Could not find or click pagination control, end of list");
                return CrawlPhase::Done;
            }
        }
    }

    /// Runs the bootstrap sequence within the retry budget
    async fn bootstrap(&mut self) -> Option<ContentSurface> {
        let attempts = self.retry.max_retries;
        for attempt in 0..attempts {
            if let Some(surface) = self.navigator.bootstrap(&self.driver).await {
                return Some(surface);
            }
            if attempt + 1 < attempts {
                let wait = self.retry.delay_for(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = attempts,
                    "List view not reached, retrying in {}ms",
                    wait.as_millis()
                );
                sleep(wait).await;
            }
        }

        let err = HarvestError::Bootstrap { attempts };
        tracing::error!("Initial navigation failed: {}", err);
        self.stats.terminal_error = Some(err.to_string());
        None
    }

    async fn process_page(&mut self, surface: &mut ContentSurface, mut rows: RowSet) -> PageOutcome {
        let page = self.cursor.page_number();

        let mut next_index = 0;
        while next_index < rows.count {
            let index = next_index;
            next_index += 1;
            if self.target_reached() || self.time_exhausted() {
                return PageOutcome::Stop;
            }
            self.cursor.set_row(index);

            let row = match rows.row(&self.driver, &surface.frame, index).await {
                Ok(Some(row)) => row,
                Ok(None) => {
                    tracing::debug!(page, row = index, "Row no longer present");
                    self.stats.record_rejection(RejectReason::Unreadable);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(page, row = index, error = %e, "Rows unreadable, leaving page");
                    return PageOutcome::Abandoned;
                }
            };
            self.stats.rows_seen += 1;

            let bid_no = match RowFacts::gather(&self.driver, &row, &self.config.site).await {
                Ok(facts) => match facts.admit(&self.config.site) {
                    Ok(bid_no) => bid_no,
                    Err(reason) => {
                        tracing::debug!(page, row = index, reason = %reason, "Skipping row");
                        self.stats.record_rejection(reason);
                        continue;
                    }
                },
                Err(e) => {
                    tracing::debug!(page, row = index, error = %e, "Skipping unreadable row");
                    self.stats.record_rejection(RejectReason::Unreadable);
                    continue;
                }
            };

            if self.visited.is_visited(&bid_no) {
                let streak = self.cursor.record_duplicate();
                self.stats.duplicates_skipped += 1;
                tracing::info!(page, row = index, bid_no = %bid_no, consecutive = streak, "Skipping already visited");
                if streak >= self.config.crawler.max_duplicates {
                    tracing::info!(
                        limit = self.config.crawler.max_duplicates,
                        "Reached consecutive duplicate limit, stopping crawl"
                    );
                    return PageOutcome::Stop;
                }
                continue;
            }
            self.cursor.reset_duplicates();

            self.process_row(surface, &row, index, &bid_no).await;

            let rung = self.navigator.return_to_list(&self.driver, surface).await;
            self.stats.record_recovery(rung);

            sleep(Duration::from_millis(self.config.crawler.row_delay_ms)).await;

            match rung {
                RecoveryRung::Soft => match self.restore_page(surface, page).await {
                    Some(fresh) => {
                        tracing::info!(page, rows = fresh.count, resume_at = next_index, "List restored after soft recovery");
                        rows = fresh;
                    }
                    None => return PageOutcome::Reloaded,
                },
                RecoveryRung::Hard => return PageOutcome::Restarted,
                RecoveryRung::Exhausted => {
                    tracing::error!(page, row = index, bid_no = %bid_no, "List view lost, abandoning page");
                    return PageOutcome::Abandoned;
                }
                _ => {}
            }
        }

        if self.target_reached() {
            return PageOutcome::Stop;
        }
        PageOutcome::Finished
    }

    /// Opens one row's detail view, extracts it, and commits the record
    async fn process_row(&mut self, surface: &ContentSurface, row: &ElementHandle, index: usize, bid_no: &str) {
        let page = self.cursor.page_number();
        let (target, strategy) = link_target(&self.driver, row, &self.config.site).await;
        if strategy == crate::crawler::rows::LinkStrategy::Row {
            tracing::warn!(page, row = index, "No anchor found in row, clicking row itself");
        }

        let label: String = self
            .driver
            .inner_text(&target)
            .await
            .unwrap_or_default()
            .trim()
            .chars()
            .take(50)
            .collect();
        tracing::info!(page, row = index, bid_no = %bid_no, link = %label, "Processing row");

        match tokio::time::timeout(SCROLL_TIMEOUT, self.driver.scroll_into_view(&target)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Scroll into view failed"),
            Err(_) => tracing::debug!("Scroll into view timed out"),
        }

        let clicked = self
            .retry
            .retry("click row link", || self.driver.click(&target, ClickMode::Normal))
            .await;
        if let Err(e) = clicked {
            tracing::warn!(page, row = index, error = %e, "Normal click failed, trying force click");
            self.stats.forced_clicks += 1;
            if let Err(e) = self.driver.click(&target, ClickMode::Force).await {
                tracing::error!(page, row = index, bid_no = %bid_no, error = %e, "Failed to open row");
                self.stats.extraction_failures += 1;
                return;
            }
        }

        let site = &self.config.site;
        let detail_timeout = Duration::from_millis(self.config.crawler.detail_timeout_ms);
        match wait_for_text(
            &self.driver,
            &surface.frame,
            &site.detail_marker_selector,
            &site.detail_marker_text,
            detail_timeout,
        )
        .await
        {
            Ok(_) => sleep(DETAIL_SETTLE).await,
            Err(e) => tracing::warn!(page, row = index, error = %e, "Timeout waiting for detail content"),
        }

        let source_url = self.driver.frame_url(&surface.frame).await.ok();
        let record = match self.driver.content(&surface.frame).await {
            Ok(html) => self.extractor.extract(&html, source_url.as_deref()),
            Err(e) => {
                tracing::error!(page, row = index, bid_no = %bid_no, error = %e, "Could not read detail page");
                Record::empty(source_url)
            }
        };

        if record.is_valid() && record.id != bid_no {
            tracing::warn!(row_bid_no = %bid_no, bid_no = %record.id, "Detail page belongs to another row");
        }
        self.commit(record);
    }

    /// Appends a record and persists progress
    ///
    /// Returns true if the record was kept.
    fn commit(&mut self, record: Record) -> bool {
        if !record.is_valid() {
            tracing::warn!("Failed to extract bid_no from detail page");
            self.stats.extraction_failures += 1;
            return false;
        }
        if self.visited.is_visited(&record.id) {
            tracing::warn!(bid_no = %record.id, "Record already collected, not adding it again");
            return false;
        }

        let id = record.id.trim().to_string();
        let title = record.title.clone();
        self.results.push(record);
        self.visited.mark_visited(&id);
        self.stats.records_committed += 1;

        if let Err(e) = self.visited.flush() {
            tracing::error!(bid_no = %id, "Failed to save visited set: {}", e);
        }
        if let Err(e) = self.snapshot.write(&self.results) {
            tracing::error!(bid_no = %id, "Incremental save failed: {}", e);
        }

        match self.config.crawler.target_count {
            Some(target) => tracing::info!(bid_no = %id, title = %title, "Parsed ({}/{})", self.results.len(), target),
            None => tracing::info!(bid_no = %id, title = %title, "Parsed ({})", self.results.len()),
        }
        true
    }

    /// Walks a freshly searched list from its first page back to `page`
    ///
    /// Returns the rows of `page`, or `None` if paging stopped short; the
    /// cursor then points at the page the list actually shows.
    async fn restore_page(&mut self, surface: &ContentSurface, page: u32) -> Option<RowSet> {
        self.cursor.hard_reset();
        let settle = Duration::from_millis(self.config.crawler.page_settle_ms);

        while self.cursor.page_number() < page {
            let next = self.cursor.page_number() + 1;
            match go_to_page(&self.driver, &surface.frame, &self.config.site, next).await {
                Some(strategy) => {
                    tracing::debug!(page = next, strategy = %strategy, "Restoring page position");
                    self.cursor.next_page();
                    if let Err(e) = self.driver.wait_for_network_idle(settle).await {
                        tracing::debug!(error = %e, "Network did not go idle after paging");
                    }
                    sleep(settle).await;
                }
                None => {
                    tracing::warn!(page = next, target = page, "Could not page back after reload");
                    return None;
                }
            }
        }

        let rows = resolve_rows(&self.driver, &surface.frame, &self.config.site).await;
        if rows.is_none() {
            tracing::warn!(page, "No rows after restoring page");
        }
        rows
    }

    /// Moves to the next page; false once no pager control can be found
    async fn advance_page(&mut self, surface: &mut ContentSurface) -> bool {
        let next = self.cursor.page_number() + 1;
        let settle = Duration::from_millis(self.config.crawler.page_settle_ms);
        let attempts = self.config.crawler.pagination_attempts.max(1);

        for attempt in 1..=attempts {
            if attempt > 1 {
                tracing::info!(page = next, attempt, "Retrying pagination after settle delay");
                sleep(settle).await;
                if let Some(found) = self.navigator.locator().locate(&self.driver).await {
                    *surface = found;
                }
            }

            if let Some(strategy) = go_to_page(&self.driver, &surface.frame, &self.config.site, next).await {
                self.cursor.next_page();
                self.stats.record_pagination(next, strategy.as_str());
                if let Err(e) = self.driver.wait_for_network_idle(settle).await {
                    tracing::debug!(error = %e, "Network did not go idle after paging");
                }
                sleep(settle).await;
                return true;
            }
        }

        let labels = visible_page_labels(&self.driver, &surface.frame, &self.config.site).await;
        tracing::info!(page = next, labels = ?labels, "Visible pagination links");
        self.dump_pagination(surface).await;
        false
    }

    async fn dump_pagination(&self, surface: &ContentSurface) {
        let path = &self.config.output.pagination_dump_path;
        if path.is_empty() {
            return;
        }
        match self.driver.content(&surface.frame).await {
            Ok(html) => match write_atomic(Path::new(path), html.as_bytes()) {
                Ok(()) => tracing::info!(path = %path, "Saved pagination debug dump"),
                Err(e) => tracing::warn!(path = %path, "Could not save pagination dump: {}", e),
            },
            Err(e) => tracing::debug!(error = %e, "No content for pagination dump"),
        }
    }
}
