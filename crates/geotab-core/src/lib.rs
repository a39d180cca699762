//! geotab-core: Core library for maintaining photo-metadata tables
//!
//! This library provides functionality to:
//! - Read CSV and spreadsheet tables with windowing, filtering and projection
//! - Append rows to existing tables, aligned by column name
//! - Normalize arbitrary headers into canonical columns via synonym maps
//! - Merge derived values (addresses, grades, ...) into cells as deduplicated sets
//! - Edit rows found by a key column and write cleaned copies of tables
//! - Scan directories for tables and run JSON pipelines of operations
//!
//! Every in-place rewrite goes through a temporary file in the same
//! directory that is persisted over the original.

pub mod cleaner;
pub mod config;
pub mod editor;
pub mod error;
pub mod merger;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod reader;
pub mod scanner;
pub mod store;
pub mod table;
pub mod writer;

pub use cleaner::TableCleaner;
pub use config::{Config, SetEncoding};
pub use editor::RowEditor;
pub use error::{Error, Result};
pub use merger::{CellMerger, MergeReport};
pub use normalizer::{HeaderNormalizer, HeaderSynonyms, SynonymMap};
pub use parser::{parse_csv_str, TableFormat};
pub use pipeline::{run_pipeline, PipelineFile, PipelineReport, Step, StepOutcome};
pub use reader::{Diagnostic, KeyRole, ReadOutcome, ReadQuery, TableReader};
pub use scanner::{scan_tables, ScanResult, TableEntry};
pub use table::{cells_match, CellValue, Column, MatchKey, Row, Table};
pub use writer::TableWriter;
