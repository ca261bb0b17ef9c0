//! Multi-sheet workbook export
//!
//! The workbook is a single `.xlsx` file. The main sheet has one row per
//! record; every sub-grid label becomes its own sheet whose rows are prefixed
//! with the announcement number so they can be joined back to the main sheet.

use crate::model::{FieldValue, Record, ResultCollection};
use crate::output::traits::{Exporter, OutputError, OutputResult};
use crate::storage::write_atomic;
use indexmap::{IndexMap, IndexSet};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};
use std::path::PathBuf;
use tracing::{info, warn};

/// Name of the main sheet
pub const MAIN_SHEET: &str = "입찰공고요약";

/// Column joining sub-grid rows to the main sheet
pub const BID_NO_COLUMN: &str = "입찰공고번호";

/// Column holding the detail page location
pub const URL_COLUMN: &str = "상세페이지URL";

/// Main sheet columns that lead, when present
pub const PRIORITY_COLUMNS: [&str; 7] = [
    BID_NO_COLUMN,
    "입찰공고명",
    "공고명",
    "수요기관",
    "공고기관",
    "계약방법",
    URL_COLUMN,
];

const MAX_SHEET_NAME: usize = 31;
const FALLBACK_SHEET: &str = "Grid_Data";
const FORBIDDEN_SHEET_CHARS: [char; 7] = [':', '/', '\\', '?', '*', '[', ']'];

/// Names no sub-grid sheet may take, compared ignoring case
const RESERVED_SHEETS: [&str; 2] = [MAIN_SHEET, "History"];

/// Sheet name for a sub-grid label
///
/// Trimmed, with `: / \ ? * [ ]` replaced by `_`, cut to 31 characters and
/// stripped of surrounding apostrophes. Blank labels map to `Grid_Data`.
pub fn sheet_name(label: &str) -> String {
    let cleaned = label.trim().replace(FORBIDDEN_SHEET_CHARS, "_");
    let truncated: String = cleaned.chars().take(MAX_SHEET_NAME).collect();
    let name = truncated.trim_matches(|c: char| c == '\'' || c.is_whitespace());
    if name.is_empty() {
        return FALLBACK_SHEET.to_string();
    }
    name.to_string()
}

/// Main sheet cell text pointing at a sub-grid sheet
pub fn sheet_placeholder(sheet: &str) -> String {
    format!("[Sub-grid: See Sheet '{}']", sheet)
}

/// Sheet names assigned to the sub-grid labels of a result set
///
/// Each distinct label gets one sheet. Names are unique ignoring case and
/// never take a reserved name; a clash gets a `_2`, `_3`, ... suffix that
/// still fits in 31 characters.
#[derive(Debug, Clone, Default)]
pub struct SheetNames {
    by_label: IndexMap<String, String>,
    taken: IndexSet<String>,
}

impl SheetNames {
    /// Assigns names to every sub-grid label in record order
    pub fn for_results(results: &ResultCollection) -> Self {
        let mut names = Self {
            by_label: IndexMap::new(),
            taken: RESERVED_SHEETS.iter().map(|n| n.to_lowercase()).collect(),
        };
        for record in results.iter() {
            for (label, value) in &record.fields {
                if matches!(value, FieldValue::Table(_)) {
                    names.assign(label);
                }
            }
        }
        names
    }

    fn assign(&mut self, label: &str) -> String {
        let label = label.trim();
        if let Some(name) = self.by_label.get(label) {
            return name.clone();
        }
        let base = sheet_name(label);
        let mut name = base.clone();
        let mut n = 2;
        while self.taken.contains(&name.to_lowercase()) {
            let suffix = format!("_{}", n);
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            name = base.chars().take(keep).collect::<String>() + &suffix;
            n += 1;
        }
        self.taken.insert(name.to_lowercase());
        self.by_label.insert(label.to_string(), name.clone());
        name
    }

    /// Sheet holding the grid under `label`
    pub fn get(&self, label: &str) -> String {
        self.by_label
            .get(label.trim())
            .cloned()
            .unwrap_or_else(|| sheet_name(label))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
/// One sheet: header plus rows, ready to render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    fn from_maps(name: String, leading: &[&str], maps: &[IndexMap<String, String>]) -> Self {
        let mut columns: IndexSet<String> = leading.iter().map(|c| c.to_string()).collect();
        for map in maps {
            for key in map.keys() {
                columns.insert(key.clone());
            }
        }
        let header: Vec<String> = columns.into_iter().collect();
        let rows = maps
            .iter()
            .map(|map| {
                header
                    .iter()
                    .map(|col| map.get(col).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Self { name, header, rows }
    }

    /// Removes columns with no non-empty cell
    fn drop_empty_columns(&mut self) {
        let keep: Vec<bool> = (0..self.header.len())
            .map(|i| self.rows.iter().any(|row| !row[i].is_empty()))
            .collect();
        let filter = |cells: &mut Vec<String>| {
            let mut i = 0;
            cells.retain(|_| {
                let kept = keep[i];
                i += 1;
                kept
            });
        };
        filter(&mut self.header);
        for row in &mut self.rows {
            filter(row);
        }
    }
}

/// The main sheet followed by sub-grid sheets in first-seen order
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Lays out `results` as sheets
    ///
    /// Records without any fields are skipped, matching a failed page that
    /// was nonetheless committed with only an identifier.
    pub fn build(results: &ResultCollection) -> Self {
        let mut main_rows: Vec<IndexMap<String, String>> = Vec::new();
        let mut detected: IndexSet<String> = IndexSet::new();
        let mut grids: IndexMap<String, Vec<IndexMap<String, String>>> = IndexMap::new();
        let names = SheetNames::for_results(results);

        for record in results.iter().filter(|r| !r.fields.is_empty()) {
            let bid_no = bid_number(record);
            let mut main_row = IndexMap::new();
            main_row.insert(
                URL_COLUMN.to_string(),
                record.source_url.clone().unwrap_or_default(),
            );

            for (label, value) in &record.fields {
                let key = label.trim().to_string();
                match value {
                    FieldValue::Table(table) => {
                        let sheet = names.get(&key);
                        let rows = grids.entry(sheet.clone()).or_default();
                        for grid_row in table.rows() {
                            let mut flat = IndexMap::new();
                            flat.insert(BID_NO_COLUMN.to_string(), bid_no.clone());
                            for (col, cell) in grid_row {
                                if col != BID_NO_COLUMN {
                                    flat.insert(col.clone(), cell.clone());
                                }
                            }
                            rows.push(flat);
                        }
                        main_row.insert(key.clone(), sheet_placeholder(&sheet));
                    }
                    FieldValue::Text(text) => {
                        main_row.insert(key.clone(), collapse_whitespace(text));
                    }
                }
                detected.insert(key);
            }
            main_row
                .entry(BID_NO_COLUMN.to_string())
                .or_insert_with(|| bid_no.clone());
            main_rows.push(main_row);
        }

        let mut sheets = Vec::new();
        if main_rows.is_empty() {
            return Self { sheets };
        }

        let present: IndexSet<&str> = main_rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect();
        let mut leading: Vec<&str> = PRIORITY_COLUMNS
            .iter()
            .copied()
            .filter(|c| present.contains(c))
            .collect();
        for key in &detected {
            if !leading.contains(&key.as_str()) {
                leading.push(key.as_str());
            }
        }

        let mut main = Sheet::from_maps(MAIN_SHEET.to_string(), &leading, &main_rows);
        main.drop_empty_columns();
        sheets.push(main);

        for (name, rows) in grids {
            if rows.is_empty() {
                continue;
            }
            sheets.push(Sheet::from_maps(name, &[BID_NO_COLUMN], &rows));
        }

        Self { sheets }
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Renders every sheet into `.xlsx` bytes
    ///
    /// Headers are bold and frozen; empty cells are left unwritten.
    pub fn to_xlsx(&self) -> OutputResult<Vec<u8>> {
        let mut book = XlsxWorkbook::new();
        let bold = Format::new().set_bold();
        for sheet in &self.sheets {
            let worksheet = book.add_worksheet();
            worksheet.set_name(&sheet.name)?;
            worksheet.set_freeze_panes(1, 0)?;
            for (col, title) in sheet.header.iter().enumerate() {
                worksheet.write_string_with_format(0, column(sheet, col)?, title, &bold)?;
            }
            for (index, row) in sheet.rows.iter().enumerate() {
                let row_num = u32::try_from(index + 1)
                    .map_err(|_| OutputError::Format(format!("sheet '{}' has too many rows", sheet.name)))?;
                for (col, cell) in row.iter().enumerate() {
                    if !cell.is_empty() {
                        worksheet.write_string(row_num, column(sheet, col)?, cell)?;
                    }
                }
            }
        }
        Ok(book.save_to_buffer()?)
    }
}

fn bid_number(record: &Record) -> String {
    record
        .text(BID_NO_COLUMN)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| record.id.clone())
}

fn column(sheet: &Sheet, index: usize) -> OutputResult<u16> {
    u16::try_from(index)
        .map_err(|_| OutputError::Format(format!("sheet '{}' has too many columns", sheet.name)))
}

/// Writes the workbook file
#[derive(Debug, Clone)]
pub struct WorkbookExporter {
    path: PathBuf,
}

impl WorkbookExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Exporter for WorkbookExporter {
    fn export(&self, results: &ResultCollection) -> OutputResult<Vec<PathBuf>> {
        let workbook = Workbook::build(results);
        if workbook.sheets.is_empty() {
            warn!(path = %self.path.display(), "No records with fields; workbook not written");
            return Ok(Vec::new());
        }

        write_atomic(&self.path, &workbook.to_xlsx()?)?;

        let sub_sheets: Vec<&str> = workbook.sheets[1..].iter().map(|s| s.name.as_str()).collect();
        info!(
            path = %self.path.display(),
            rows = workbook.sheets[0].rows.len(),
            sub_sheets = ?sub_sheets,
            "Wrote workbook export"
        );
        Ok(vec![self.path.clone()])
    }

    fn name(&self) -> &'static str {
        "workbook"
    }
}
