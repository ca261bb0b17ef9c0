//! Data model for extracted announcements
//!
//! A [`Record`] is built once per successful detail-page visit and never
//! mutated afterwards. Its `fields` keep the page's own label text as keys, in
//! the order they were discovered; embedded sub-grids live in the same map as
//! [`FieldValue::Table`] entries.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One row of a sub-grid: column label to cell text
pub type TableRow = IndexMap<String, String>;

/// An ordered sequence of rows from one sub-grid on a detail page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabularDataset {
    rows: Vec<TableRow>,
}

impl TabularDataset {
    pub fn new(rows: Vec<TableRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Value stored under a field label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Table(TabularDataset),
}

impl FieldValue {
    /// Returns the text if this is a scalar field
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Table(_) => None,
        }
    }

    /// Returns the dataset if this is a sub-grid field
    pub fn as_table(&self) -> Option<&TabularDataset> {
        match self {
            Self::Text(_) => None,
            Self::Table(table) => Some(table),
        }
    }
}

/// Ordered label to value mapping
pub type Fields = IndexMap<String, FieldValue>;

/// One extracted bid announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Bid announcement number; empty means extraction failed
    pub id: String,

    /// Display name of the announcement (may be empty)
    pub title: String,

    /// Detail page location at extraction time
    pub source_url: Option<String>,

    /// Every label/value pair and sub-grid found on the detail page
    #[serde(default)]
    pub fields: Fields,

    pub extracted_at: Option<DateTime<Utc>>,
}

impl Record {
    /// A record carrying no identifier, used when extraction fails
    pub fn empty(source_url: Option<String>) -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            source_url,
            fields: Fields::new(),
            extracted_at: None,
        }
    }

    /// True when the record may be persisted
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Scalar field lookup
    pub fn text(&self, label: &str) -> Option<&str> {
        self.fields.get(label).and_then(FieldValue::as_text)
    }

    /// Iterates over the sub-grids of this record
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TabularDataset)> {
        self.fields
            .iter()
            .filter_map(|(name, value)| value.as_table().map(|table| (name.as_str(), table)))
    }
}

/// Records collected during a run, in commit order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCollection {
    records: Vec<Record>,
}

impl ResultCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record; the collection is append-only
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Identifiers in commit order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.id.as_str())
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.records.iter().any(|record| record.id == id)
    }
}

impl From<Vec<Record>> for ResultCollection {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl<'a> IntoIterator for &'a ResultCollection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
