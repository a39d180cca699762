//! Error types for geotab-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in geotab-core
#[derive(Debug, Error)]
pub enum Error {
    /// Path argument was empty or not usable as a file path
    #[error("invalid filepath argument: '{0}'")]
    InvalidPath(String),

    /// Table file does not exist on disk
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File extension is not one this operation handles
    #[error("unsupported file format '{extension}' for {path}")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// CSV parsing or writing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Spreadsheet could not be opened or read
    #[error("spreadsheet error in '{path}': {source}")]
    Spreadsheet {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    /// Spreadsheet could not be written
    #[error("failed to write spreadsheet '{path}': {source}")]
    SpreadsheetWrite {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    /// Spreadsheet has no worksheet to read
    #[error("no worksheet found in {0}")]
    NoWorksheet(PathBuf),

    /// Incoming row does not have one cell per head column
    #[error("row {row} length ({found}) doesn't match head length ({expected})")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Referenced column is not part of the table header
    #[error("column '{column}' not found in {path}")]
    ColumnNotFound { column: String, path: PathBuf },

    /// No row satisfied the lookup
    #[error("no rows found where {column} == {value} in {path}")]
    NoMatchingRows {
        column: String,
        value: String,
        path: PathBuf,
    },

    /// The same alias is registered under two canonical columns
    #[error("alias '{alias}' is registered for both '{first}' and '{second}'")]
    AmbiguousAlias {
        alias: String,
        first: String,
        second: String,
    },

    /// Malformed arguments
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Replacing the original file with the rewritten one failed
    #[error("failed to replace '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
