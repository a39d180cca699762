//! Appending rows to an existing table aligned by common columns

use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser::{self, TableFormat};
use crate::store;
use crate::table::{Row, Table};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Appends batches of rows to existing table files
#[derive(Debug, Clone)]
pub struct TableWriter {
    config: Config,
}

impl TableWriter {
    /// Create a writer
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Append `rows` (laid out as `head`) to the table at `path`
    ///
    /// The file must already exist. Columns shared by the file and `head`
    /// receive values, file columns absent from `head` are left empty, and
    /// `head` columns unknown to the file are dropped. A file with no columns
    /// takes `head` as its header. Returns the table as written.
    pub fn append<P: AsRef<Path>>(&self, path: P, head: &[String], rows: &[Vec<String>]) -> Result<Table> {
        let path = self.config.existing_file(path)?;

        for (i, row) in rows.iter().enumerate() {
            if row.len() != head.len() {
                return Err(Error::RowLength {
                    row: i,
                    expected: head.len(),
                    found: row.len(),
                });
            }
        }

        let format = TableFormat::require(&path)?;
        if format == TableFormat::Spreadsheet && parser::extension_of(&path) != "xlsx" {
            return Err(parser::unsupported(&path));
        }

        let grid = parser::load_grid(&path, self.config.sample_bytes)?;
        let delimiter = grid.delimiter;
        let (header, records) = grid.split_header();
        let mut table = Table::from_records(path.clone(), header, records);
        table.normalize_width();

        if rows.is_empty() {
            debug!("nothing to append to {}", path.display());
            return Ok(table);
        }

        if table.column_count() == 0 {
            table = Table::from_records(path.clone(), head.to_vec(), rows.to_vec());
        } else {
            let aligned = align_rows(&table.header(), head, rows);
            table.rows.extend(aligned.into_iter().map(Row::new));
        }

        store::write_table(&path, format, &table.header(), &table.records(), delimiter)?;
        info!("appended {} rows to {}", rows.len(), path.display());

        Ok(table)
    }

    /// Append every row of the table at `source` to the table at `target`
    pub fn append_table<P: AsRef<Path>, Q: AsRef<Path>>(&self, target: P, source: Q) -> Result<Table> {
        let source = self.config.existing_file(source)?;
        let (head, records) = parser::load_grid(&source, self.config.sample_bytes)?.split_header();

        let mut incoming = Table::from_records(source, head, records);
        incoming.normalize_width();

        self.append(target, &incoming.header(), &incoming.records())
    }
}

/// Lay out `rows` (in `head` order) under `existing` columns
fn align_rows(existing: &[String], head: &[String], rows: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut head_index: HashMap<&str, usize> = HashMap::new();
    for (i, name) in head.iter().enumerate() {
        head_index.entry(name.as_str()).or_insert(i);
    }

    rows.iter()
        .map(|row| {
            existing
                .iter()
                .map(|col| match head_index.get(col.as_str()) {
                    Some(&i) => row[i].clone(),
                    None => String::new(),
                })
                .collect()
        })
        .collect()
}
