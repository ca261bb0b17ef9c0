//! Detail page extraction
//!
//! This module turns a serialized detail page into a [`Record`]:
//! - Label/value pairing over the page's form text elements
//! - Every embedded grid as a named [`TabularDataset`]

use crate::config::SiteProfile;
use crate::model::{FieldValue, Fields, Record, TableRow, TabularDataset};
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, info};

/// Title used for a grid with no heading before it
pub const UNKNOWN_GRID_TITLE: &str = "Unknown Grid";

/// Errors raised while building an extractor
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid selector for {name}: '{selector}'")]
    Selector { name: &'static str, selector: String },
}

fn compile(name: &'static str, selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|_| ExtractError::Selector {
        name,
        selector: selector.to_string(),
    })
}

/// Text of an element with every text node trimmed and the pieces joined
fn stripped_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Extracts records from detail page snapshots
///
/// Selectors are compiled once from the [`SiteProfile`]; extraction itself is
/// a pure function of the HTML and source URL.
#[derive(Debug)]
pub struct RecordExtractor {
    pairing: Selector,
    label: Selector,
    grid: Selector,
    title: Selector,
    header: Selector,
    header_fallback: Selector,
    body_table: Selector,
    body_rows_fallback: Selector,
    row: Selector,
    cell: Selector,
    cell_value: Selector,
    id_aliases: Vec<String>,
    title_aliases: Vec<String>,
}

impl RecordExtractor {
    pub fn new(profile: &SiteProfile) -> Result<Self, ExtractError> {
        let pairing = format!("{}, {}", profile.label_selector, profile.value_selector);
        Ok(Self {
            pairing: compile("label/value pairing", &pairing)?,
            label: compile("label_selector", &profile.label_selector)?,
            grid: compile("detail_grid", &profile.detail_grid)?,
            title: compile("grid_title_selector", &profile.grid_title_selector)?,
            header: compile("grid_header_selector", &profile.grid_header_selector)?,
            header_fallback: compile("grid_header_fallback", &profile.grid_header_fallback)?,
            body_table: compile("grid_body_table", &profile.grid_body_table)?,
            body_rows_fallback: compile(
                "grid_body_rows_fallback",
                &profile.grid_body_rows_fallback,
            )?,
            row: compile("row", "tr")?,
            cell: compile("cell", "td")?,
            cell_value: compile("grid_cell_value", &profile.grid_cell_value)?,
            id_aliases: profile.id_aliases.clone(),
            title_aliases: profile.title_aliases.clone(),
        })
    }

    /// Builds a record from a detail page snapshot
    pub fn extract(&self, html: &str, source_url: Option<&str>) -> Record {
        let document = Html::parse_document(html);

        let mut fields = self.pair_labels(&document);
        let scalar_count = fields.len();

        for (title, dataset) in self.extract_grids(&document) {
            fields.insert(title, FieldValue::Table(dataset));
        }

        let id = first_alias(&fields, &self.id_aliases);
        let title = first_alias(&fields, &self.title_aliases);

        debug!(
            bid_no = %id,
            fields = scalar_count,
            grids = fields.len().saturating_sub(scalar_count),
            "Extracted detail page"
        );

        Record {
            id,
            title,
            source_url: source_url.map(str::to_string),
            fields,
            extracted_at: Some(Utc::now()),
        }
    }

    /// First pass: every value consumes the most recent unconsumed label
    pub fn pair_labels(&self, document: &Html) -> Fields {
        let mut fields = Fields::new();
        let mut pending: Option<String> = None;

        for element in document.select(&self.pairing) {
            let text = stripped_text(&element);
            if text.is_empty() {
                continue;
            }

            if self.label.matches(&element) {
                pending = Some(text);
            } else if let Some(key) = pending.take() {
                fields.insert(key, FieldValue::Text(text));
            }
        }

        fields
    }

    /// Second pass: every non-empty grid, keyed by its nearest preceding title
    pub fn extract_grids(&self, document: &Html) -> Vec<(String, TabularDataset)> {
        let mut grids = Vec::new();
        let mut last_title: Option<String> = None;

        for node in document.root_element().descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };

            if self.grid.matches(&element) {
                let title = last_title
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_GRID_TITLE.to_string());
                let rows = self.parse_grid(&element);
                if rows.is_empty() {
                    debug!(grid = %title, "Skipping grid without rows");
                } else {
                    info!(grid = %title, rows = rows.len(), "Extracted grid");
                    grids.push((title, TabularDataset::new(rows)));
                }
            }

            if self.title.matches(&element) {
                last_title = Some(stripped_text(&element));
            }
        }

        grids
    }

    fn parse_grid(&self, container: &ElementRef<'_>) -> Vec<TableRow> {
        let mut headers: Vec<String> = container.select(&self.header).map(|h| stripped_text(&h)).collect();
        if headers.is_empty() {
            headers = container
                .select(&self.header_fallback)
                .map(|h| stripped_text(&h))
                .collect();
        }
        if headers.is_empty() {
            return Vec::new();
        }

        let body_rows: Vec<ElementRef<'_>> = match container.select(&self.body_table).next() {
            Some(table) => table.select(&self.row).collect(),
            None => container.select(&self.body_rows_fallback).collect(),
        };

        let mut rows = Vec::new();
        for tr in body_rows {
            let cells: Vec<ElementRef<'_>> = tr.select(&self.cell).collect();
            if cells.is_empty() {
                continue;
            }

            let mut row = TableRow::new();
            for (header, cell) in headers.iter().zip(cells.iter()) {
                row.insert(header.clone(), self.cell_text(cell));
            }
            if !row.is_empty() {
                rows.push(row);
            }
        }
        rows
    }

    fn cell_text(&self, cell: &ElementRef<'_>) -> String {
        match cell.select(&self.cell_value).next() {
            Some(value) if value.value().name() == "input" => value
                .value()
                .attr("value")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            Some(value) => stripped_text(&value),
            None => stripped_text(cell),
        }
    }
}

fn first_alias(fields: &Fields, aliases: &[String]) -> String {
    aliases
        .iter()
        .filter_map(|alias| fields.get(alias).and_then(FieldValue::as_text))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}
