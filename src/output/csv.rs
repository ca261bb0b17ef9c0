//! Flat CSV export
//!
//! One row per record: the fixed record columns first, then the union of every
//! scalar field label in first-seen order. Sub-grids are not flattened; their
//! cell carries a pointer to the workbook sheet that holds them.

use crate::model::{FieldValue, ResultCollection};
use crate::output::traits::{Exporter, OutputResult};
use crate::output::workbook::{sheet_placeholder, SheetNames};
use crate::storage::write_atomic;
use indexmap::IndexSet;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

/// Byte order mark so spreadsheet software detects UTF-8
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const FIXED_COLUMNS: [&str; 4] = ["id", "title", "source_url", "extracted_at"];

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Writes a single CSV row to any writer
pub fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            w.write_all(b",")?;
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\r\n")
}

/// Renders a header row and data rows as BOM-prefixed CSV bytes
pub fn render_table(header: &[String], rows: &[Vec<String>]) -> io::Result<Vec<u8>> {
    let mut buf = UTF8_BOM.to_vec();
    write_row(&mut buf, header)?;
    for row in rows {
        write_row(&mut buf, row)?;
    }
    Ok(buf)
}

/// Writes the flat results file
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: PathBuf,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Header and rows for `results`, without writing anything
    pub fn table(results: &ResultCollection) -> (Vec<String>, Vec<Vec<String>>) {
        let mut field_keys: IndexSet<&str> = IndexSet::new();
        for record in results.iter() {
            for key in record.fields.keys() {
                if !FIXED_COLUMNS.contains(&key.as_str()) {
                    field_keys.insert(key.as_str());
                }
            }
        }

        let sheets = SheetNames::for_results(results);
        let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend(field_keys.iter().map(|k| k.to_string()));

        let rows = results
            .iter()
            .map(|record| {
                let mut row = vec![
                    record.id.clone(),
                    record.title.clone(),
                    record.source_url.clone().unwrap_or_default(),
                    record
                        .extracted_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default(),
                ];
                for key in &field_keys {
                    let cell = match record.fields.get(*key) {
                        Some(FieldValue::Text(text)) => text.clone(),
                        Some(FieldValue::Table(_)) => sheet_placeholder(&sheets.get(key)),
                        None => String::new(),
                    };
                    row.push(cell);
                }
                row
            })
            .collect();

        (header, rows)
    }
}

impl Exporter for CsvExporter {
    fn export(&self, results: &ResultCollection) -> OutputResult<Vec<PathBuf>> {
        let (header, rows) = Self::table(results);
        let bytes = render_table(&header, &rows)?;
        write_atomic(&self.path, &bytes)?;
        info!(path = %self.path.display(), rows = rows.len(), columns = header.len(), "Wrote CSV export");
        Ok(vec![self.path.clone()])
    }

    fn name(&self) -> &'static str {
        "csv"
    }
}
