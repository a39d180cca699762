//! In-place edits of rows selected by a key column

use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser::{self, TableFormat};
use crate::store;
use crate::table::{cells_match, Table};
use std::path::Path;
use tracing::info;

/// Overwrites cells of rows found by a key column value
#[derive(Debug, Clone)]
pub struct RowEditor {
    config: Config,
}

impl RowEditor {
    /// Create an editor
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Apply `rows` (laid out as `head`) to rows whose `column_key` cell is `value`
    ///
    /// With as many replacement rows as matches they are applied in order;
    /// otherwise the first replacement row is applied to every match. `head`
    /// columns missing from the table are appended to it.
    pub fn edit_rows<P: AsRef<Path>>(
        &self,
        path: P,
        column_key: &str,
        value: &str,
        head: &[String],
        rows: &[Vec<String>],
    ) -> Result<Table> {
        let path = self.config.existing_file(path)?;

        let format = TableFormat::require(&path)?;
        if format == TableFormat::Spreadsheet && parser::extension_of(&path) != "xlsx" {
            return Err(parser::unsupported(&path));
        }

        if rows.is_empty() {
            return Err(Error::InvalidArgument("no replacement rows given".to_string()));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != head.len() {
                return Err(Error::RowLength {
                    row: i,
                    expected: head.len(),
                    found: row.len(),
                });
            }
        }

        let grid = parser::load_grid(&path, self.config.sample_bytes)?;
        let delimiter = grid.delimiter;
        let (header, records) = grid.split_header();
        let mut table = Table::from_records(path.clone(), header, records);
        table.normalize_width();

        let key_idx = table.column_index(column_key).ok_or_else(|| Error::ColumnNotFound {
            column: column_key.to_string(),
            path: path.clone(),
        })?;

        let matches: Vec<usize> = table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| cells_match(r.value(key_idx), value))
            .map(|(i, _)| i)
            .collect();
        if matches.is_empty() {
            return Err(Error::NoMatchingRows {
                column: column_key.to_string(),
                value: value.to_string(),
                path,
            });
        }

        let targets: Vec<usize> = head
            .iter()
            .map(|name| match table.column_index(name) {
                Some(idx) => idx,
                None => table.push_column(name.as_str()),
            })
            .collect();
        let width = table.column_count();

        for (n, &row_idx) in matches.iter().enumerate() {
            let replacement = if rows.len() == matches.len() {
                &rows[n]
            } else {
                &rows[0]
            };
            let row = &mut table.rows[row_idx];
            row.pad_to(width);
            for (&col, cell) in targets.iter().zip(replacement) {
                row.cells[col] = cell.clone();
            }
        }

        store::write_table(&path, format, &table.header(), &table.records(), delimiter)?;
        info!(
            "edited {} rows where {} == {} in {}",
            matches.len(),
            column_key,
            value,
            path.display()
        );

        Ok(table)
    }
}
