//! Windowed, filtered reads that always hand back a table-shaped value
//!
//! Validation problems with the path itself (empty, missing file) are errors.
//! Everything past that point degrades instead: an unsupported extension, an
//! unknown column key or a file that fails to parse yields an empty or partial
//! table plus [`Diagnostic`]s, so a batch caller never aborts on one bad file.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser::{self, TableFormat};
use crate::table::{cells_match, Row, Table};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which query field referenced a missing column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    /// `column_key`
    Column,
    /// `second_column_key`
    SecondColumn,
}

/// A non-fatal problem attached to a read result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Extension is neither delimited text nor a spreadsheet
    UnsupportedFormat { extension: String },
    /// No row with a non-blank cell to use as header
    EmptyTable,
    /// A query key is not part of the header
    MissingColumn { role: KeyRole, key: String },
    /// Loading failed; the message carries the cause
    Unexpected { message: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnsupportedFormat { extension } => {
                write!(f, "unsupported file extension: '{}'", extension)
            }
            Diagnostic::EmptyTable => write!(f, "table appears empty: no header found"),
            Diagnostic::MissingColumn { role, key } => {
                let field = match role {
                    KeyRole::Column => "columnKey",
                    KeyRole::SecondColumn => "secondColumnKey",
                };
                write!(f, "{} '{}' not found in header", field, key)
            }
            Diagnostic::Unexpected { message } => write!(f, "unexpected error: {}", message),
        }
    }
}

/// Parameters of a read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadQuery {
    /// Data rows to skip (header excluded)
    pub start: usize,
    /// Maximum data rows to collect
    pub amount: usize,
    /// Column to project, or to filter on when `field_value` is set
    pub column_key: Option<String>,
    /// Value `column_key` must match
    pub field_value: Option<String>,
    /// Column projected from the filtered rows
    pub second_column_key: Option<String>,
    /// Header supplied externally; the file's first line is then data
    pub header_override: Option<Vec<String>>,
}

impl Default for ReadQuery {
    fn default() -> Self {
        Self {
            start: 0,
            amount: crate::config::DEFAULT_AMOUNT,
            column_key: None,
            field_value: None,
            second_column_key: None,
            header_override: None,
        }
    }
}

impl ReadQuery {
    /// Create a query reading the first `amount` rows
    pub fn new(amount: usize) -> Self {
        Self {
            amount,
            ..Self::default()
        }
    }

    /// Set the row window
    pub fn window(mut self, start: usize, amount: usize) -> Self {
        self.start = start;
        self.amount = amount;
        self
    }

    /// Project a single column
    pub fn column(mut self, key: impl Into<String>) -> Self {
        self.column_key = Some(key.into());
        self
    }

    /// Keep rows whose `key` cell equals `value`
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.column_key = Some(key.into());
        self.field_value = Some(value.into());
        self
    }

    /// Project `key` from the filtered rows
    pub fn project(mut self, key: impl Into<String>) -> Self {
        self.second_column_key = Some(key.into());
        self
    }

    /// Treat the file as headerless and use `header`
    pub fn with_header(mut self, header: Vec<String>) -> Self {
        self.header_override = Some(header);
        self
    }

    fn mode(&self) -> ReadMode<'_> {
        match (&self.column_key, &self.field_value, &self.second_column_key) {
            (None, _, _) => ReadMode::Full,
            (Some(key), None, _) => ReadMode::Column(key),
            (Some(key), Some(value), None) => ReadMode::Filter { key, value },
            (Some(key), Some(value), Some(project)) => ReadMode::FilterProject {
                key,
                value,
                project,
            },
        }
    }
}

/// The output shape selected by which query keys are present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode<'q> {
    Full,
    Column(&'q str),
    Filter { key: &'q str, value: &'q str },
    FilterProject {
        key: &'q str,
        value: &'q str,
        project: &'q str,
    },
}

/// Table produced by a read plus any diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    /// Result table (possibly empty)
    pub table: Table,
    /// Non-fatal problems met while reading
    pub diagnostics: Vec<Diagnostic>,
}

impl ReadOutcome {
    fn degraded(path: PathBuf, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            table: Table::new(path),
            diagnostics,
        }
    }

    /// True when no diagnostic was attached
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Diagnostics joined into one log line, if any
    pub fn log_line(&self) -> Option<String> {
        if self.diagnostics.is_empty() {
            return None;
        }
        Some(
            self.diagnostics
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(" | "),
        )
    }
}

/// Reads tables from CSV and spreadsheet files
#[derive(Debug, Clone)]
pub struct TableReader {
    config: Config,
}

impl TableReader {
    /// Create a reader
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Query with the configured default window
    pub fn query(&self) -> ReadQuery {
        ReadQuery::new(self.config.default_amount)
    }

    /// Read a table according to `query`
    pub fn read<P: AsRef<Path>>(&self, path: P, query: &ReadQuery) -> Result<ReadOutcome> {
        let path = self.config.existing_file(path)?;
        let mut diagnostics = Vec::new();

        let Some(format) = TableFormat::from_path(&path) else {
            let extension = parser::extension_of(&path);
            warn!("refusing to read {}: unsupported extension", path.display());
            diagnostics.push(Diagnostic::UnsupportedFormat { extension });
            return Ok(ReadOutcome::degraded(path, diagnostics));
        };

        let table = match self.load_window(&path, query) {
            Ok(Some(table)) => table,
            Ok(None) => {
                diagnostics.push(Diagnostic::EmptyTable);
                return Ok(ReadOutcome::degraded(path, diagnostics));
            }
            Err(e) => {
                warn!("failed to read {:?} table {}: {}", format, path.display(), e);
                diagnostics.push(e.into());
                return Ok(ReadOutcome::degraded(path, diagnostics));
            }
        };

        let table = apply_mode(table, query, &mut diagnostics);
        debug!(
            "read {} rows x {} columns from {}",
            table.row_count(),
            table.column_count(),
            path.display()
        );

        Ok(ReadOutcome { table, diagnostics })
    }

    /// Trimmed values of `keys` for every data row
    ///
    /// A key missing from the header yields empty strings.
    pub fn select<P: AsRef<Path>>(&self, path: P, keys: &[&str]) -> Result<Vec<Vec<String>>> {
        let path = self.config.existing_file(path)?;
        let (header, records) = parser::load_grid(&path, self.config.sample_bytes)?.split_header();

        let indices: Vec<Option<usize>> = keys
            .iter()
            .map(|key| header.iter().position(|h| h == key))
            .collect();

        Ok(records
            .into_iter()
            .filter(|r| !parser::is_blank(r))
            .map(|record| {
                let row = Row::new(record);
                indices
                    .iter()
                    .map(|idx| idx.map(|i| row.value(i).trim().to_string()).unwrap_or_default())
                    .collect()
            })
            .collect())
    }

    /// Load, resolve the header, window and pad; `None` when no header exists
    fn load_window(&self, path: &Path, query: &ReadQuery) -> Result<Option<Table>> {
        let grid = parser::load_grid(path, self.config.sample_bytes)?;

        let (header, records) = match &query.header_override {
            Some(header) => (header.clone(), grid.records),
            None => {
                let (header, records) = grid.split_header();
                if header.is_empty() {
                    return Ok(None);
                }
                (header, records)
            }
        };

        let windowed = records
            .into_iter()
            .skip(query.start)
            .take(query.amount)
            .collect();

        let mut table = Table::from_records(path.to_path_buf(), header, windowed);
        table.normalize_width();
        Ok(Some(table))
    }
}

fn apply_mode(table: Table, query: &ReadQuery, diagnostics: &mut Vec<Diagnostic>) -> Table {
    let key_idx = lookup(&table, query.column_key.as_deref(), KeyRole::Column, diagnostics);
    let second_idx = lookup(
        &table,
        query.second_column_key.as_deref(),
        KeyRole::SecondColumn,
        diagnostics,
    );

    let source = table.source_path.clone();
    match query.mode() {
        ReadMode::Full => table,
        ReadMode::Column(key) => {
            let rows = match key_idx {
                Some(i) => table.rows.iter().map(|r| vec![r.value(i).to_string()]).collect(),
                None => Vec::new(),
            };
            Table::from_records(source, vec![key.to_string()], rows)
        }
        ReadMode::Filter { value, .. } => {
            let header = table.header();
            let rows = matching(&table, key_idx, value).map(|r| r.cells.clone()).collect();
            Table::from_records(source, header, rows)
        }
        ReadMode::FilterProject { value, project, .. } => {
            let rows = match second_idx {
                Some(second) => matching(&table, key_idx, value)
                    .map(|r| vec![r.value(second).to_string()])
                    .collect(),
                None => Vec::new(),
            };
            Table::from_records(source, vec![project.to_string()], rows)
        }
    }
}

fn lookup(
    table: &Table,
    key: Option<&str>,
    role: KeyRole,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<usize> {
    let key = key?;
    let idx = table.column_index(key);
    if idx.is_none() {
        diagnostics.push(Diagnostic::MissingColumn {
            role,
            key: key.to_string(),
        });
    }
    idx
}

fn matching<'t>(
    table: &'t Table,
    key_idx: Option<usize>,
    value: &'t str,
) -> impl Iterator<Item = &'t Row> + 't {
    table
        .rows
        .iter()
        .filter(move |r| key_idx.is_some_and(|i| cells_match(r.value(i), value)))
}

impl From<Error> for Diagnostic {
    fn from(e: Error) -> Self {
        Diagnostic::Unexpected {
            message: e.to_string(),
        }
    }
}
