//! JSON-file backends for the visited set and the result snapshot

use crate::model::{Record, ResultCollection};
use crate::storage::traits::{StorageError, StorageResult, VisitedStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk layout of the visited set
#[derive(Debug, Default, Serialize, Deserialize)]
struct VisitedFile {
    #[serde(default)]
    visited_ids: Vec<String>,
}

/// Layouts accepted on load: the wrapped object or a bare array of ids
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredVisited {
    Wrapped(VisitedFile),
    Plain(Vec<String>),
}

impl StoredVisited {
    fn into_ids(self) -> Vec<String> {
        match self {
            StoredVisited::Wrapped(file) => file.visited_ids,
            StoredVisited::Plain(ids) => ids,
        }
    }
}

/// Visited set persisted as `{"visited_ids": [...]}`
///
/// A file holding a bare JSON array of ids is also read; the next flush
/// rewrites it in the wrapped form.
#[derive(Debug)]
pub struct JsonVisitedStore {
    path: PathBuf,
    ids: BTreeSet<String>,
    ignore_existing: bool,
}

impl JsonVisitedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ids: BTreeSet::new(),
            ignore_existing: false,
        }
    }

    /// Opens the store and loads the existing file
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        store.load();
        store
    }

    /// Store whose `load` ignores any existing file
    ///
    /// The old file is replaced on the first flush.
    pub fn fresh(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        store.ignore_existing = true;
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> StorageResult<BTreeSet<String>> {
        let raw = fs::read_to_string(path)?;
        let stored: StoredVisited = serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(stored
            .into_ids()
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect())
    }
}

impl VisitedStore for JsonVisitedStore {
    fn load(&mut self) {
        if self.ignore_existing {
            info!(path = %self.path.display(), "Fresh run, ignoring existing visited set");
            self.ids.clear();
            return;
        }

        if !self.path.exists() {
            info!(path = %self.path.display(), "No visited set found, starting empty");
            self.ids.clear();
            return;
        }

        match Self::read(&self.path) {
            Ok(ids) => {
                info!(path = %self.path.display(), count = ids.len(), "Loaded visited set");
                self.ids = ids;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Visited set unreadable, starting empty");
                self.ids.clear();
            }
        }
    }

    fn is_visited(&self, id: &str) -> bool {
        self.ids.contains(id.trim())
    }

    fn mark_visited(&mut self, id: &str) -> bool {
        self.ids.insert(id.trim().to_string())
    }

    fn flush(&self) -> StorageResult<()> {
        let file = VisitedFile {
            visited_ids: self.ids.iter().cloned().collect(),
        };
        let body = serde_json::to_string_pretty(&file)?;
        write_atomic(&self.path, body.as_bytes())?;
        debug!(path = %self.path.display(), count = self.ids.len(), "Flushed visited set");
        Ok(())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}

/// Writes the full result collection as a pretty JSON array
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, results: &ResultCollection) -> StorageResult<()> {
        let body = serde_json::to_string_pretty(results)?;
        write_atomic(&self.path, body.as_bytes())?;
        debug!(path = %self.path.display(), records = results.len(), "Wrote snapshot");
        Ok(())
    }
}

/// Reads a snapshot written by [`SnapshotWriter`]
pub fn load_snapshot(path: &Path) -> StorageResult<ResultCollection> {
    let raw = fs::read_to_string(path)?;
    let records: Vec<Record> = serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(ResultCollection::from(records))
}

/// Replaces `path` with `bytes` through a sibling temporary file and a rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
