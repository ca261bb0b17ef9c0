//! Crawler module for walking the announcement list
//!
//! This module contains the core crawling logic, including:
//! - Content frame discovery
//! - Grid row discovery, filtering, and activation
//! - Detail page extraction
//! - Navigation, recovery, and pagination
//! - Overall crawl orchestration

mod coordinator;
mod extractor;
mod locator;
mod navigator;
mod pagination;
mod retry;
mod rows;

pub use coordinator::Orchestrator;
pub use extractor::{ExtractError, RecordExtractor, UNKNOWN_GRID_TITLE};
pub use locator::{ContentLocator, ContentSurface, FrameSignal, LocatedBy};
pub use navigator::Navigator;
pub use pagination::{click_by_id_script, click_by_text_script, go_to_page, PageStrategy};
pub use retry::RetryPolicy;
pub use rows::{link_target, resolve_rows, LinkStrategy, RowFacts, RowSet, RowStrategy};
