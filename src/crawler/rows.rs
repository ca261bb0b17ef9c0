//! Grid row discovery, filtering, and activation targets

use crate::browser::wait::first_visible;
use crate::browser::{Driver, DriverResult, ElementHandle, FramePath};
use crate::config::SiteProfile;
use crate::state::RejectReason;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Polls made while waiting for the first row to carry text
const FIRST_ROW_POLLS: u32 = 10;
const FIRST_ROW_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Where a page's row collection came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStrategy {
    /// One of the priority selectors, only tried when the list header is rendered
    Priority(String),
    /// The configured grid row selector
    Configured(String),
}

impl RowStrategy {
    /// Strategies in the order they are tried
    pub fn ordered(profile: &SiteProfile) -> Vec<RowStrategy> {
        let mut strategies: Vec<RowStrategy> = profile
            .row_selectors
            .iter()
            .map(|s| RowStrategy::Priority(s.clone()))
            .collect();
        strategies.push(RowStrategy::Configured(profile.grid_row.clone()));
        strategies
    }

    pub fn selector(&self) -> &str {
        match self {
            Self::Priority(s) | Self::Configured(s) => s,
        }
    }

    /// Number of rows this strategy yields, or `None` if it does not apply
    pub async fn attempt<D: Driver + ?Sized>(
        &self,
        driver: &D,
        frame: &FramePath,
        header_present: bool,
    ) -> Option<usize> {
        if matches!(self, Self::Priority(_)) && !header_present {
            return None;
        }
        match driver.query_all(frame, self.selector()).await {
            Ok(rows) if !rows.is_empty() => Some(rows.len()),
            Ok(_) => None,
            Err(e) => {
                debug!(selector = self.selector(), error = %e, "Row strategy failed");
                None
            }
        }
    }
}

impl fmt::Display for RowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Priority(s) => write!(f, "priority '{}'", s),
            Self::Configured(s) => write!(f, "configured '{}'", s),
        }
    }
}

/// Row collection adopted for one page
///
/// Rows are re-queried by index before each use since returning from a
/// detail page re-renders the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSet {
    pub strategy: RowStrategy,
    pub count: usize,
}

impl RowSet {
    /// Handle of the row at `index` in the current DOM
    pub async fn row<D: Driver + ?Sized>(
        &self,
        driver: &D,
        frame: &FramePath,
        index: usize,
    ) -> DriverResult<Option<ElementHandle>> {
        let rows = driver.query_all(frame, self.strategy.selector()).await?;
        Ok(rows.into_iter().nth(index))
    }
}

/// Resolves the rows of the current page, or `None` if the page has none
pub async fn resolve_rows<D: Driver + ?Sized>(
    driver: &D,
    frame: &FramePath,
    profile: &SiteProfile,
) -> Option<RowSet> {
    let header_present = driver
        .text_content(frame)
        .await
        .map(|text| text.contains(&profile.header_phrase))
        .unwrap_or(false);

    for strategy in RowStrategy::ordered(profile) {
        if let Some(count) = strategy.attempt(driver, frame, header_present).await {
            info!(strategy = %strategy, rows = count, "Resolved grid rows");
            let set = RowSet { strategy, count };
            wait_for_first_row_text(driver, frame, &set).await;
            return Some(set);
        }
    }
    None
}

/// Gives the grid time to fill its first row with data
async fn wait_for_first_row_text<D: Driver + ?Sized>(driver: &D, frame: &FramePath, set: &RowSet) {
    for _ in 0..FIRST_ROW_POLLS {
        if let Ok(Some(row)) = set.row(driver, frame, 0).await {
            if let Ok(text) = driver.inner_text(&row).await {
                if !text.trim().is_empty() {
                    return;
                }
            }
        }
        tokio::time::sleep(FIRST_ROW_POLL_INTERVAL).await;
    }
    debug!("First row still empty, continuing");
}

/// Everything the admissibility filter looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFacts {
    pub id_attr: String,
    pub style: String,
    pub class: String,
    pub visible: bool,
    pub cell_count: usize,
    pub text: String,
    /// Text of the identifier cell, empty if the row has no such cell
    pub id_cell_text: String,
}

impl RowFacts {
    /// Reads the facts of a row from the live DOM
    pub async fn gather<D: Driver + ?Sized>(
        driver: &D,
        row: &ElementHandle,
        profile: &SiteProfile,
    ) -> DriverResult<Self> {
        let id_attr = driver.attribute(row, "id").await?.unwrap_or_default();
        let style = driver.attribute(row, "style").await?.unwrap_or_default();
        let class = driver.attribute(row, "class").await?.unwrap_or_default();
        let visible = driver.is_visible(row).await?;
        let cells = driver.query_within(row, "td").await?;
        let text = driver.inner_text(row).await?;
        let id_cell_text = match cells.get(profile.id_cell_index) {
            Some(cell) => driver.inner_text(cell).await?,
            None => String::new(),
        };

        Ok(Self {
            id_attr,
            style,
            class,
            visible,
            cell_count: cells.len(),
            text,
            id_cell_text,
        })
    }

    /// True for grid plumbing rows that never hold data
    pub fn is_system_row(&self, profile: &SiteProfile) -> bool {
        let style: String = self.style.chars().filter(|c| !c.is_whitespace()).collect();
        let style = style.to_ascii_lowercase();

        (!profile.scroll_helper_token.is_empty() && self.id_attr.contains(&profile.scroll_helper_token))
            || style.contains("display:none")
            || style.contains("height:0px")
            || (!profile.hidden_row_class.is_empty()
                && self
                    .class
                    .split_whitespace()
                    .any(|c| c == profile.hidden_row_class))
    }

    /// Applies the admissibility checks in order
    ///
    /// Returns the row's identifier when every check passes.
    pub fn admit(&self, profile: &SiteProfile) -> Result<String, RejectReason> {
        if self.is_system_row(profile) {
            return Err(RejectReason::SystemRow);
        }
        if !self.visible {
            return Err(RejectReason::NotVisible);
        }
        if self.cell_count < profile.min_cells {
            return Err(RejectReason::TooFewCells);
        }
        if self.text.trim().is_empty() {
            return Err(RejectReason::EmptyText);
        }
        let id = self.id_cell_text.trim();
        if id.is_empty() {
            return Err(RejectReason::EmptyIdentifier);
        }
        Ok(id.to_string())
    }
}

/// How the element clicked to open a row's detail page was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStrategy {
    /// First visible anchor anywhere in the row
    RowAnchor,
    /// First anchor of a candidate cell, if visible
    CellAnchor,
    /// The row element itself
    Row,
}

impl LinkStrategy {
    pub const ORDERED: [LinkStrategy; 3] = [Self::RowAnchor, Self::CellAnchor, Self::Row];

    pub async fn attempt<D: Driver + ?Sized>(
        &self,
        driver: &D,
        row: &ElementHandle,
        profile: &SiteProfile,
    ) -> Option<ElementHandle> {
        match self {
            Self::RowAnchor => {
                let anchors = driver.query_within(row, "a").await.ok()?;
                first_visible(driver, &anchors).await
            }
            Self::CellAnchor => {
                let cells = driver.query_within(row, "td").await.ok()?;
                for &index in &profile.link_cell_candidates {
                    let Some(cell) = cells.get(index) else {
                        continue;
                    };
                    let Ok(anchors) = driver.query_within(cell, "a").await else {
                        continue;
                    };
                    if let Some(anchor) = anchors.into_iter().next() {
                        if let Ok(true) = driver.is_visible(&anchor).await {
                            return Some(anchor);
                        }
                    }
                }
                None
            }
            Self::Row => Some(row.clone()),
        }
    }
}

impl fmt::Display for LinkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RowAnchor => "row_anchor",
            Self::CellAnchor => "cell_anchor",
            Self::Row => "row",
        };
        f.write_str(name)
    }
}

/// Picks the element to click for a row
pub async fn link_target<D: Driver + ?Sized>(
    driver: &D,
    row: &ElementHandle,
    profile: &SiteProfile,
) -> (ElementHandle, LinkStrategy) {
    for strategy in LinkStrategy::ORDERED {
        if let Some(target) = strategy.attempt(driver, row, profile).await {
            return (target, strategy);
        }
    }
    (row.clone(), LinkStrategy::Row)
}
