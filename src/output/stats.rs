//! Statistics over persisted harvest state
//!
//! This module reads the snapshot and visited-set files written by a run and
//! reports how they relate, without starting a browser.

use crate::model::ResultCollection;
use crate::storage::{load_snapshot, JsonVisitedStore, VisitedStore};
use crate::HarvestError;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::Path;

/// Persisted state summary
#[derive(Debug, Clone, Default)]
pub struct HarvestStatistics {
    /// Records in the snapshot
    pub snapshot_records: u64,

    /// Identifiers in the visited set
    pub visited_ids: u64,

    /// Visited identifiers with no record in the snapshot
    pub visited_without_record: Vec<String>,

    /// Snapshot records whose identifier is not in the visited set
    pub records_not_visited: Vec<String>,

    /// Identifiers appearing more than once in the snapshot
    pub duplicate_record_ids: Vec<String>,

    /// Records carrying at least one sub-grid
    pub records_with_grids: u64,

    /// Sub-grid rows across all records
    pub sub_grid_rows: u64,

    /// Records with an empty title
    pub untitled_records: u64,

    /// How many records carry each field label, most common first
    pub field_frequency: IndexMap<String, u64>,
}

/// Computes statistics from an in-memory collection and visited identifiers
pub fn compute_statistics(results: &ResultCollection, visited: &[String]) -> HarvestStatistics {
    let visited_set: BTreeSet<&str> = visited.iter().map(String::as_str).collect();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut duplicates: BTreeSet<String> = BTreeSet::new();
    let mut frequency: IndexMap<String, u64> = IndexMap::new();
    let mut stats = HarvestStatistics {
        snapshot_records: results.len() as u64,
        visited_ids: visited_set.len() as u64,
        ..Default::default()
    };

    for record in results.iter() {
        let id = record.id.trim();
        if !seen.insert(id) {
            duplicates.insert(id.to_string());
        }
        if !visited_set.contains(id) {
            stats.records_not_visited.push(id.to_string());
        }
        if record.title.trim().is_empty() {
            stats.untitled_records += 1;
        }

        let mut has_grid = false;
        for (_, table) in record.tables() {
            has_grid = true;
            stats.sub_grid_rows += table.len() as u64;
        }
        if has_grid {
            stats.records_with_grids += 1;
        }

        for label in record.fields.keys() {
            *frequency.entry(label.clone()).or_insert(0) += 1;
        }
    }

    stats.visited_without_record = visited_set
        .iter()
        .filter(|id| !seen.contains(*id))
        .map(|id| id.to_string())
        .collect();
    stats.duplicate_record_ids = duplicates.into_iter().collect();

    frequency.sort_by(|_, a, _, b| b.cmp(a));
    stats.field_frequency = frequency;
    stats
}

/// Loads statistics from the snapshot and visited-set files
///
/// # Arguments
///
/// * `snapshot_path` - The JSON snapshot of collected records
/// * `visited_path` - The visited identifier file
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - The snapshot could not be read
pub fn load_statistics(snapshot_path: &Path, visited_path: &Path) -> Result<HarvestStatistics, HarvestError> {
    let results = if snapshot_path.exists() {
        load_snapshot(snapshot_path)?
    } else {
        ResultCollection::new()
    };

    let mut visited = JsonVisitedStore::new(visited_path);
    visited.load();

    Ok(compute_statistics(&results, &visited.ids()))
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Records in snapshot: {}", stats.snapshot_records);
    println!("  Visited identifiers: {}", stats.visited_ids);
    println!("  Records with sub-grids: {}", stats.records_with_grids);
    println!("  Sub-grid rows: {}", stats.sub_grid_rows);
    println!("  Untitled records: {}", stats.untitled_records);
    println!();

    if !stats.field_frequency.is_empty() {
        println!("Most common fields:");
        for (label, count) in stats.field_frequency.iter().take(20) {
            let percentage = if stats.snapshot_records > 0 {
                (*count as f64 / stats.snapshot_records as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", label, count, percentage);
        }
        println!();
    }

    if !stats.visited_without_record.is_empty() {
        println!(
            "Visited but missing from snapshot ({}):",
            stats.visited_without_record.len()
        );
        for id in &stats.visited_without_record {
            println!("  - {}", id);
        }
        println!();
    }

    if !stats.records_not_visited.is_empty() {
        println!(
            "In snapshot but not marked visited ({}):",
            stats.records_not_visited.len()
        );
        for id in &stats.records_not_visited {
            println!("  - {}", id);
        }
        println!();
    }

    if !stats.duplicate_record_ids.is_empty() {
        println!("Duplicate identifiers ({}):", stats.duplicate_record_ids.len());
        for id in &stats.duplicate_record_ids {
            println!("  - {}", id);
        }
        println!();
    }

    let consistent = stats.visited_without_record.is_empty()
        && stats.records_not_visited.is_empty()
        && stats.duplicate_record_ids.is_empty();
    println!(
        "State is {}",
        if consistent { "consistent" } else { "inconsistent" }
    );
}
