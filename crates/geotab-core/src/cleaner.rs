//! Derived copies of a table: blank-key rows removed, merged sets collapsed

use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser;
use crate::store;
use crate::table::{CellValue, Table};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes cleaned copies of tables
#[derive(Debug, Clone)]
pub struct TableCleaner {
    config: Config,
}

impl TableCleaner {
    /// Create a cleaner
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Copy `input` to `output`, keeping only rows whose `key` cell is non-blank
    pub fn drop_blank<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, key: &str, output: Q) -> Result<PathBuf> {
        let (table, key_idx, delimiter) = self.load(input, key)?;
        let header = table.header();
        let before = table.row_count();

        let rows: Vec<Vec<String>> = table
            .rows
            .into_iter()
            .filter(|r| !r.value(key_idx).trim().is_empty())
            .map(|r| r.cells)
            .collect();

        let output = self.config.resolve(output);
        store::write_csv(&output, &header, &rows, delimiter)?;
        info!(
            "kept {} of {} rows with '{}' set, wrote {}",
            rows.len(),
            before,
            key,
            output.display()
        );
        Ok(output)
    }

    /// Copy `input` to `output`, replacing merged sets in `key` by their first non-blank item
    ///
    /// Cells that are not JSON arrays are copied unchanged.
    pub fn collapse_sets<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, key: &str, output: Q) -> Result<PathBuf> {
        let (mut table, key_idx, delimiter) = self.load(input, key)?;

        let mut collapsed = 0;
        for row in &mut table.rows {
            if let Some(first) = collapse_cell(row.value(key_idx)) {
                row.cells[key_idx] = first;
                collapsed += 1;
            }
        }

        let output = self.config.resolve(output);
        store::write_csv(&output, &table.header(), &table.records(), delimiter)?;
        info!(
            "collapsed {} cells of '{}', wrote {}",
            collapsed,
            key,
            output.display()
        );
        Ok(output)
    }

    fn load<P: AsRef<Path>>(&self, input: P, key: &str) -> Result<(Table, usize, u8)> {
        let input = self.config.existing_file(input)?;
        let grid = parser::load_grid(&input, self.config.sample_bytes)?;
        let delimiter = grid.delimiter;
        let (header, records) = grid.split_header();

        let mut table = Table::from_records(input.clone(), header, records);
        table.normalize_width();

        let key_idx = table.column_index(key).ok_or_else(|| Error::ColumnNotFound {
            column: key.to_string(),
            path: input,
        })?;
        Ok((table, key_idx, delimiter))
    }
}

/// First non-blank item of a stored JSON array; `None` for any other cell
fn collapse_cell(cell: &str) -> Option<String> {
    let trimmed = cell.trim();
    if !trimmed.starts_with('[') {
        return None;
    }
    serde_json::from_str::<Vec<serde_json::Value>>(trimmed).ok()?;

    let first = CellValue::parse(trimmed)
        .items()
        .into_iter()
        .map(str::trim)
        .find(|item| !item.is_empty())
        .unwrap_or_default()
        .to_string();
    Some(first)
}
