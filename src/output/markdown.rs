//! Markdown summary generation
//!
//! This module generates a human-readable markdown summary of a harvest run:
//! timing, row accounting, recovery usage and the pagination trail.

use crate::output::traits::{OutputResult, RunSummary};
use crate::state::RecoveryRung;
use crate::storage::write_atomic;
use std::path::Path;

/// Generates a markdown summary file for a run
///
/// # Arguments
///
/// * `summary` - The run summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);
    write_atomic(output_path, markdown.as_bytes())?;
    Ok(())
}

fn rung_label(rung: RecoveryRung) -> &'static str {
    match rung {
        RecoveryRung::ListButton => "List button",
        RecoveryRung::HistoryBack => "History back",
        RecoveryRung::Soft => "Soft recovery",
        RecoveryRung::Hard => "Hard recovery",
        RecoveryRung::Exhausted => "Exhausted (page abandoned)",
    }
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Nuri-Harvest Run Summary\n\n");

    md.push_str("## Run Information\n\n");
    if let Some(started) = &summary.started_at {
        md.push_str(&format!("- **Started**: {}\n", started));
    }
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished));
    }
    if let Some(duration) = summary.duration_seconds {
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    let phase = summary
        .terminal_phase
        .map(|p| p.as_str())
        .unwrap_or("unknown");
    md.push_str(&format!("- **Terminal Phase**: {}\n", phase));
    if let Some(error) = &summary.terminal_error {
        md.push_str(&format!("- **Terminal Error**: {}\n", error));
    }
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    md.push_str("## Records\n\n");
    md.push_str(&format!(
        "- **Records Collected**: {}\n",
        summary.records_collected
    ));
    md.push_str(&format!("- **Rows Seen**: {}\n", summary.rows_seen));
    md.push_str(&format!(
        "- **Duplicates Skipped**: {}\n",
        summary.duplicates_skipped
    ));
    md.push_str(&format!("- **Rows Rejected**: {}\n", summary.total_rejected()));
    md.push_str(&format!(
        "- **Extraction Failures**: {}\n",
        summary.extraction_failures
    ));
    md.push_str(&format!("- **Forced Clicks**: {}\n", summary.forced_clicks));
    md.push_str(&format!("- **Yield**: {:.2}%\n\n", summary.yield_rate()));

    if !summary.rows_rejected.is_empty() {
        md.push_str("## Rejected Rows\n\n");
        md.push_str("| Reason | Count |\n");
        md.push_str("|--------|-------|\n");
        for (reason, count) in &summary.rows_rejected {
            md.push_str(&format!("| {} | {} |\n", reason, count));
        }
        md.push('\n');
    }

    md.push_str("## Returns to List\n\n");
    md.push_str("| Rung | Count |\n");
    md.push_str("|------|-------|\n");
    for (rung, count) in &summary.recoveries {
        md.push_str(&format!("| {} | {} |\n", rung_label(*rung), count));
    }
    md.push('\n');

    md.push_str("## Pagination\n\n");
    md.push_str(&format!("- **Pages Visited**: {}\n\n", summary.pages_visited));
    if !summary.pagination_log.is_empty() {
        md.push_str("| Page | Strategy |\n");
        md.push_str("|------|----------|\n");
        for (page, strategy) in &summary.pagination_log {
            md.push_str(&format!("| {} | {} |\n", page, strategy));
        }
        md.push('\n');
    }

    md
}
