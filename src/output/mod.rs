//! Output module for exports and run reports
//!
//! This module handles:
//! - Flat CSV export of the collected records
//! - Multi-sheet workbook export with sub-grids split out
//! - Markdown summaries of a run
//! - Statistics over the persisted state files

mod csv;
mod markdown;
pub mod stats;
mod traits;
mod workbook;

pub use csv::{render_table, write_row, CsvExporter, UTF8_BOM};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{compute_statistics, load_statistics, print_statistics, HarvestStatistics};
pub use traits::{Exporter, OutputError, OutputResult, RunSummary};
pub use workbook::{
    sheet_name, sheet_placeholder, Sheet, SheetNames, Workbook, WorkbookExporter, MAIN_SHEET,
    PRIORITY_COLUMNS,
};

use crate::config::OutputConfig;
use crate::model::ResultCollection;
use std::path::PathBuf;
use tracing::{error, info};

/// Exporters configured by the `[output]` section
pub fn exporters(config: &OutputConfig) -> Vec<Box<dyn Exporter>> {
    vec![
        Box::new(CsvExporter::new(&config.csv_path)),
        Box::new(WorkbookExporter::new(&config.workbook_path)),
    ]
}

/// Runs every exporter over `results`
///
/// A failing exporter is logged and does not stop the others; the first
/// error is returned once all of them have run.
///
/// # Arguments
///
/// * `config` - Output locations
/// * `results` - The collected records
///
/// # Returns
///
/// * `Ok(Vec<PathBuf>)` - Every file written
/// * `Err(OutputError)` - At least one exporter failed
pub fn export_all(config: &OutputConfig, results: &ResultCollection) -> OutputResult<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut first_error = None;

    for exporter in exporters(config) {
        match exporter.export(results) {
            Ok(paths) => written.extend(paths),
            Err(e) => {
                error!(exporter = exporter.name(), error = %e, "Export failed");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            info!(files = written.len(), records = results.len(), "Exports complete");
            Ok(written)
        }
    }
}
