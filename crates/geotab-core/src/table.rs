//! Core table types: string grids, scalar-or-set cells and match keys

use crate::config::SetEncoding;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

/// A table loaded from a single file
///
/// Every value is a string. After [`Table::normalize_width`] every row has
/// exactly one cell per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column definitions
    pub columns: Vec<Column>,
    /// Row data
    pub rows: Vec<Row>,
    /// Source file path
    pub source_path: PathBuf,
}

impl Table {
    /// Create a new empty table
    pub fn new(source_path: PathBuf) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            source_path,
        }
    }

    /// Build a table from a header and raw records
    pub fn from_records(source_path: PathBuf, header: Vec<String>, records: Vec<Vec<String>>) -> Self {
        Self {
            columns: header
                .into_iter()
                .enumerate()
                .map(|(i, name)| Column::new(name, i))
                .collect(),
            rows: records.into_iter().map(Row::new).collect(),
            source_path,
        }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Index of the first column called `name`
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.find_column(name).map(|c| c.index)
    }

    /// Column names in order
    pub fn header(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Row cells as plain string records
    pub fn records(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(|r| r.cells.clone()).collect()
    }

    /// Append a column, padding every existing row; returns its index
    pub fn push_column(&mut self, name: impl Into<String>) -> usize {
        let index = self.columns.len();
        self.columns.push(Column::new(name.into(), index));
        for row in &mut self.rows {
            row.pad_to(index + 1);
        }
        index
    }

    /// Right-pad the header and every row to the widest of them
    pub fn normalize_width(&mut self) {
        let width = self
            .rows
            .iter()
            .map(|r| r.cells.len())
            .chain(std::iter::once(self.columns.len()))
            .max()
            .unwrap_or(0);

        while self.columns.len() < width {
            let index = self.columns.len();
            self.columns.push(Column::new(String::new(), index));
        }
        for row in &mut self.rows {
            row.pad_to(width);
        }
    }
}

/// A column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as found in the header row
    pub name: String,
    /// Column index (0-based)
    pub index: usize,
}

impl Column {
    /// Create a new column
    pub fn new(name: String, index: usize) -> Self {
        Self { name, index }
    }
}

/// A row of string cells
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Cell values for each column
    pub cells: Vec<String>,
}

impl Row {
    /// Create a new row
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    /// Get a cell value by column index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    /// Cell value by index, empty when the row is too short
    pub fn value(&self, index: usize) -> &str {
        self.get(index).unwrap_or("")
    }

    /// Pad with empty cells up to `width`
    pub fn pad_to(&mut self, width: usize) {
        if self.cells.len() < width {
            self.cells.resize(width, String::new());
        }
    }
}

/// Equality used for every key lookup: both sides trimmed, no coercion
pub fn cells_match(cell: &str, expected: &str) -> bool {
    cell.trim() == expected.trim()
}

/// A cell holding zero, one or many logical values
///
/// On disk the three shapes are an empty string, a bare string and a JSON
/// array of strings. A single item is never stored as a one-element array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellValue {
    /// Nothing stored
    #[default]
    Empty,
    /// One value, stored bare
    Scalar(String),
    /// Two or more distinct values
    Set(Vec<String>),
}

impl CellValue {
    /// Parse a stored cell
    ///
    /// A JSON array contributes its stringified elements; anything else is a
    /// single item (the trimmed cell), never split on delimiters.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return CellValue::Empty;
        }

        if trimmed.starts_with('[') {
            if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
                return CellValue::from_items(items.into_iter().map(json_item_to_string));
            }
        }

        CellValue::Scalar(trimmed.to_string())
    }

    /// Parse a cell written with `encoding`
    ///
    /// With [`SetEncoding::Joined`] a non-JSON cell is split on `" | "`, so
    /// cells the merger wrote read back as the same items.
    pub fn decode(s: &str, encoding: SetEncoding) -> Self {
        let trimmed = s.trim();
        match encoding {
            SetEncoding::Json => CellValue::parse(trimmed),
            SetEncoding::Joined => match CellValue::parse(trimmed) {
                CellValue::Scalar(_) if trimmed.contains(JOINED_SEPARATOR) => CellValue::from_items(
                    trimmed
                        .split(JOINED_SEPARATOR)
                        .map(str::trim)
                        .filter(|item| !item.is_empty()),
                ),
                other => other,
            },
        }
    }

    /// Build a cell from items, dropping repeats while keeping first-seen order
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for item in items {
            let item = item.into();
            if !unique.contains(&item) {
                unique.push(item);
            }
        }

        match unique.len() {
            0 => CellValue::Empty,
            1 => CellValue::Scalar(unique.remove(0)),
            _ => CellValue::Set(unique),
        }
    }

    /// The logical items in order
    pub fn items(&self) -> Vec<&str> {
        match self {
            CellValue::Empty => Vec::new(),
            CellValue::Scalar(s) => vec![s.as_str()],
            CellValue::Set(items) => items.iter().map(String::as_str).collect(),
        }
    }

    /// Union with `new_items`, existing items first
    pub fn merge<I, S>(self, new_items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let existing = match self {
            CellValue::Empty => Vec::new(),
            CellValue::Scalar(s) => vec![s],
            CellValue::Set(items) => items,
        };
        CellValue::from_items(existing.into_iter().chain(new_items.into_iter().map(Into::into)))
    }

    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Serialize back to the stored string form
    pub fn encode(&self, encoding: SetEncoding) -> Result<String> {
        let items = self.items();
        match items.len() {
            0 => Ok(String::new()),
            1 => Ok(items[0].to_string()),
            _ => match encoding {
                SetEncoding::Json => encode_json_list(&items),
                SetEncoding::Joined => Ok(items.join(JOINED_SEPARATOR)),
            },
        }
    }
}

/// Separator between items of a [`SetEncoding::Joined`] cell
pub const JOINED_SEPARATOR: &str = " | ";

fn json_item_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Writes arrays as `["a", "b"]`, the layout existing tables already use
struct ListFormatter;

impl serde_json::ser::Formatter for ListFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }
}

fn encode_json_list(items: &[&str]) -> Result<String> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, ListFormatter);
    items.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Ordered (column, value) pairs identifying rows
///
/// A row matches when every pair matches its cell under that column (see
/// [`cells_match`]). A column missing from the table reads as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchKey {
    pairs: Vec<(String, String)>,
}

impl MatchKey {
    /// Create an empty key (matches every row)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((column.into(), value.into()));
        self
    }

    /// Zip parallel column and value lists
    pub fn from_parallel(columns: Vec<String>, values: Vec<String>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(Error::InvalidArgument(format!(
                "{} key columns but {} key values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self {
            pairs: columns.into_iter().zip(values).collect(),
        })
    }

    /// The pairs in order
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// True when the key has no pairs
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Check a row against the key
    pub fn matches(&self, header: &[String], row: &Row) -> bool {
        self.pairs.iter().all(|(column, value)| {
            let cell = header
                .iter()
                .position(|h| h == column)
                .map(|i| row.value(i))
                .unwrap_or("");
            cells_match(cell, value)
        })
    }
}
