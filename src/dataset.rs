//! Tabular dataset loading and writing.
//!
//! A `Dataset` is a header plus an ordered list of `Record`s. Every record
//! remembers the position it was loaded at, which is the identity the
//! pipeline uses to put results back in place. Values are kept as the
//! exact strings found in the file so a load/save cycle never rewrites
//! columns it did not touch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::debug;

use crate::error::DatasetError;

/// Column names in file order, with a name → position lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Header {
    pub fn new(columns: Vec<String>) -> Self {
        let positions = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { columns, positions }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }
}

/// One row of the dataset, addressed by its original position.
#[derive(Debug, Clone)]
pub struct Record {
    index: usize,
    header: Arc<Header>,
    values: Vec<String>,
}

impl Record {
    /// Position of this record when the dataset was loaded.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw value of a column; `None` only when the column does not exist.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.header
            .position(column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Trimmed value of a column, treating empty cells as missing.
    pub fn value(&self, column: &str) -> Option<&str> {
        self.get(column).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Trimmed value or `default` when the cell is empty or the column absent.
    pub fn value_or<'a>(&'a self, column: &str, default: &'a str) -> &'a str {
        self.value(column).unwrap_or(default)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// An ordered, in-memory table.
#[derive(Debug, Clone)]
pub struct Dataset {
    header: Arc<Header>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset from a header and rows. Short rows are padded with
    /// empty cells.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let header = Arc::new(Header::new(columns));
        let width = header.columns().len();
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(index, mut values)| {
                values.resize(width, String::new());
                Record {
                    index,
                    header: Arc::clone(&header),
                    values,
                }
            })
            .collect();
        Self { header, records }
    }

    /// Load a delimited file with a header row.
    ///
    /// Fails if the file cannot be read, is not well-formed, or lacks any
    /// of `required` columns.
    pub async fn load(path: &Path, required: &[&str]) -> Result<Self, DatasetError> {
        let bytes = fs::read(path).await.map_err(|e| DatasetError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let dataset = Self::parse(path, &bytes)?;

        if let Some(missing) = required.iter().find(|c| !dataset.header.contains(c)) {
            return Err(DatasetError::MissingColumn {
                path: path.to_path_buf(),
                column: missing.to_string(),
            });
        }

        debug!(path = %path.display(), rows = dataset.len(), "Loaded dataset");
        Ok(dataset)
    }

    fn parse(path: &Path, bytes: &[u8]) -> Result<Self, DatasetError> {
        let malformed = |reason: String| DatasetError::Malformed {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| malformed(e.to_string()))?
            .iter()
            .map(|c| c.trim_start_matches('\u{feff}').to_string())
            .collect();

        if columns.iter().all(|c| c.is_empty()) {
            return Err(malformed("missing header row".to_string()));
        }

        let mut rows = Vec::new();
        // Short rows are padded by `from_rows`; extra cells have no column.
        for row in reader.records() {
            let row = row.map_err(|e| malformed(e.to_string()))?;
            if row.len() > columns.len() {
                let line = row.position().map(|p| p.line()).unwrap_or_default();
                return Err(malformed(format!(
                    "line {line}: found {} fields, but the header has {}",
                    row.len(),
                    columns.len()
                )));
            }
            rows.push(row.iter().map(str::to_string).collect());
        }

        Ok(Self::from_rows(columns, rows))
    }

    /// Write the dataset to `path`, creating parent directories.
    ///
    /// The whole file is assembled in memory, written next to the target
    /// and renamed into place, so readers never observe a partial file.
    pub async fn save(&self, path: &Path) -> Result<(), DatasetError> {
        let bytes = self.to_csv_bytes().map_err(|reason| DatasetError::WriteFailed {
            path: path.to_path_buf(),
            reason,
        })?;
        write_atomic(path, &bytes)
            .await
            .map_err(|e| DatasetError::WriteFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        debug!(path = %path.display(), rows = self.len(), "Saved dataset");
        Ok(())
    }

    fn to_csv_bytes(&self) -> Result<Vec<u8>, String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(self.header.columns())
            .map_err(|e| e.to_string())?;
        for record in &self.records {
            writer.write_record(&record.values).map_err(|e| e.to_string())?;
        }
        writer.into_inner().map_err(|e| e.to_string())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All values of one column in row order (`None` if the column is absent).
    pub fn column(&self, column: &str) -> Option<Vec<&str>> {
        let position = self.header.position(column)?;
        Some(
            self.records
                .iter()
                .map(|r| r.values[position].as_str())
                .collect(),
        )
    }

    /// Set `columns` on every record from `rows`, which must be in record
    /// order and carry one value per column.
    ///
    /// Existing columns are overwritten in place; new ones are appended.
    pub fn set_columns(&mut self, columns: &[&str], rows: Vec<Vec<String>>) {
        assert_eq!(rows.len(), self.records.len(), "one row of values per record");

        let mut names = self.header.columns().to_vec();
        for column in columns {
            if !self.header.contains(column) {
                names.push(column.to_string());
            }
        }
        let header = Arc::new(Header::new(names));
        let width = header.columns().len();
        let targets: Vec<usize> = columns
            .iter()
            .filter_map(|c| header.position(c))
            .collect();

        for (record, values) in self.records.iter_mut().zip(rows) {
            record.values.resize(width, String::new());
            for (&position, value) in targets.iter().zip(values) {
                record.values[position] = value;
            }
            record.header = Arc::clone(&header);
        }
        self.header = header;
    }

    /// Stable sort by a numeric column, highest first. Unparseable or empty
    /// cells sort last.
    pub fn sort_by_numeric_desc(&mut self, column: &str) {
        let Some(position) = self.header.position(column) else {
            return;
        };
        let key = |r: &Record| r.values[position].trim().parse::<f64>().ok();
        self.records.sort_by(|a, b| match (key(a), key(b)) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }
}

/// Write bytes to a sibling temp file, then rename over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
