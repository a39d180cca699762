//! Directory scanner for discovering table files

use crate::error::Result;
use crate::parser::TableFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A table file found under a scanned root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Full path to the file
    pub path: PathBuf,
    /// Path relative to the root it was found under
    pub relative: PathBuf,
    /// Format detected from the extension
    pub format: TableFormat,
}

/// Result of scanning directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Root directories that were scanned
    pub roots: Vec<PathBuf>,
    /// Discovered tables, sorted by path
    pub tables: Vec<TableEntry>,
}

impl ScanResult {
    /// Find a table by its path relative to a root
    pub fn find_table(&self, relative: &Path) -> Option<&TableEntry> {
        self.tables.iter().find(|t| t.relative == relative)
    }

    /// Get the number of tables found
    pub fn total_files(&self) -> usize {
        self.tables.len()
    }
}

/// Scan one or more directories for files readable as tables
///
/// Hidden files (such as in-flight temporary rewrites) are skipped.
pub fn scan_tables<P: AsRef<Path>>(roots: &[P]) -> Result<ScanResult> {
    let mut tables = Vec::new();

    for root in roots {
        let root = root.as_ref();

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry?;
            let path = entry.path();

            if !entry.file_type().is_file() || is_hidden(path) {
                continue;
            }

            if let Some(format) = TableFormat::from_path(path) {
                let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
                tables.push(TableEntry {
                    path: path.to_path_buf(),
                    relative,
                    format,
                });
            }
        }
    }

    tables.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(ScanResult {
        roots: roots.iter().map(|r| r.as_ref().to_path_buf()).collect(),
        tables,
    })
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
