//! Access to the tabular store that holds order rows and receives the manifest.
//!
//! The store is an external collaborator of the allocation core: a [`TableSource`]
//! hands out the raw order table, a [`ManifestSink`] receives the computed manifest.
//! [`JsonFileStore`] keeps both tables as JSON arrays of rows on disk,
//! [`MemoryStore`] keeps them in memory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

use crate::model::RawRow;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} does not hold a table of rows: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of the raw order table.
pub trait TableSource {
    fn fetch_rows(&self) -> Result<Vec<RawRow>, StoreError>;
}

/// Destination of the manifest.
///
/// A run clears the destination once and then appends the manifest; appended values
/// are stored literally.
pub trait ManifestSink {
    fn clear(&self) -> Result<(), StoreError>;
    fn append(&self, rows: &[RawRow]) -> Result<(), StoreError>;
}

/// Store backed by two JSON files: the order table and the manifest.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    input: PathBuf,
    output: PathBuf,
}

impl JsonFileStore {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    fn read_table(path: &Path) -> Result<Vec<RawRow>, StoreError> {
        let raw = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_table(path: &Path, rows: &[RawRow]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(rows).map_err(|source| StoreError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl TableSource for JsonFileStore {
    fn fetch_rows(&self) -> Result<Vec<RawRow>, StoreError> {
        let rows = Self::read_table(&self.input)?;
        debug!(path = %self.input.display(), rows = rows.len(), "order table read");
        Ok(rows)
    }
}

impl ManifestSink for JsonFileStore {
    fn clear(&self) -> Result<(), StoreError> {
        Self::write_table(&self.output, &[])
    }

    fn append(&self, rows: &[RawRow]) -> Result<(), StoreError> {
        let mut table = match Self::read_table(&self.output) {
            Ok(table) => table,
            Err(StoreError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        table.extend_from_slice(rows);
        Self::write_table(&self.output, &table)?;
        debug!(path = %self.output.display(), rows = rows.len(), "manifest appended");
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    input: Vec<RawRow>,
    output: Mutex<Vec<RawRow>>,
}

impl MemoryStore {
    pub fn new(input: Vec<RawRow>) -> Self {
        Self {
            input,
            output: Mutex::new(Vec::new()),
        }
    }

    /// Current content of the manifest table.
    pub fn output(&self) -> Vec<RawRow> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TableSource for MemoryStore {
    fn fetch_rows(&self) -> Result<Vec<RawRow>, StoreError> {
        Ok(self.input.clone())
    }
}

impl ManifestSink for MemoryStore {
    fn clear(&self) -> Result<(), StoreError> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn append(&self, rows: &[RawRow]) -> Result<(), StoreError> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(rows);
        Ok(())
    }
}
