//! Backfilling cells of an existing CSV table
//!
//! Rows are picked by a [`MatchKey`] and the target cell is treated as a
//! merged set: new values are unioned into what is already stored, then the
//! whole file is rewritten atomically.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser;
use crate::store;
use crate::table::{CellValue, MatchKey, Table};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Rows changed by a merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Header of the rewritten table (includes the target column)
    pub header: Vec<String>,
    /// Every matched row after the merge, in header order
    pub updated: Vec<Vec<String>>,
}

impl MergeReport {
    /// True when no row matched and the file was left alone
    pub fn is_noop(&self) -> bool {
        self.updated.is_empty()
    }
}

/// Merges derived values (addresses, quality grades, ...) into CSV tables
#[derive(Debug, Clone)]
pub struct CellMerger {
    config: Config,
}

impl CellMerger {
    /// Create a merger
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Merge `new_values` into `target_column` of every row matching `key`
    ///
    /// The column is created when absent. With no matching row the file is
    /// not touched and the report is empty.
    pub fn merge_into<P: AsRef<Path>>(
        &self,
        path: P,
        key: &MatchKey,
        target_column: &str,
        new_values: &[String],
    ) -> Result<MergeReport> {
        if target_column.trim().is_empty() {
            return Err(Error::InvalidArgument("target column name is empty".to_string()));
        }

        let path = self.config.existing_file(path)?;
        if parser::extension_of(&path) != "csv" {
            return Err(parser::unsupported(&path));
        }

        let grid = parser::load_grid(&path, self.config.sample_bytes)?;
        let delimiter = grid.delimiter;
        let (header, records) = grid.split_header();
        let mut table = Table::from_records(path.clone(), header, records);

        let width = table.column_count();
        for (row_idx, row) in table.rows.iter_mut().enumerate() {
            if row.cells.len() > width {
                warn!(
                    "row {} in {} has more cells than columns, truncating",
                    row_idx + 1,
                    path.display()
                );
                row.cells.truncate(width);
            }
        }

        let target = match table.column_index(target_column) {
            Some(idx) => idx,
            None => table.push_column(target_column),
        };
        let width = table.column_count();
        for row in &mut table.rows {
            row.pad_to(width);
        }

        let header = table.header();
        let mut updated = Vec::new();
        for row in &mut table.rows {
            if !key.matches(&header, row) {
                continue;
            }

            let merged = CellValue::decode(row.value(target), self.config.set_encoding)
                .merge(new_values.iter().cloned());
            row.cells[target] = merged.encode(self.config.set_encoding)?;
            updated.push(row.cells.clone());
        }

        if updated.is_empty() {
            debug!("no rows of {} match {:?}", path.display(), key.pairs());
            return Ok(MergeReport { header, updated });
        }

        store::write_csv(&path, &header, &table.records(), delimiter)?;
        info!(
            "merged into '{}' of {} rows in {}",
            target_column,
            updated.len(),
            path.display()
        );

        Ok(MergeReport { header, updated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SetEncoding;
    use std::fs;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fixture(content: &str) -> (tempfile::TempDir, CellMerger) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t.csv"), content).unwrap();
        let merger = CellMerger::new(Config::with_data_dir(dir.path()));
        (dir, merger)
    }

    fn read(dir: &tempfile::TempDir) -> String {
        fs::read_to_string(dir.path().join("t.csv")).unwrap()
    }

    #[test]
    fn test_merge_scalar_then_set_then_idempotent() {
        let (dir, merger) = fixture("id,name\n1,a\n2,b\n");
        let key = MatchKey::new().with("id", "1");

        let report = merger.merge_into("t.csv", &key, "tags", &strings(&["x"])).unwrap();
        assert_eq!(report.header, strings(&["id", "name", "tags"]));
        assert_eq!(report.updated, vec![strings(&["1", "a", "x"])]);
        assert_eq!(read(&dir), "id,name,tags\n1,a,x\n2,b,\n");

        merger.merge_into("t.csv", &key, "tags", &strings(&["y"])).unwrap();
        assert_eq!(read(&dir), "id,name,tags\n1,a,\"[\"\"x\"\", \"\"y\"\"]\"\n2,b,\n");

        let report = merger.merge_into("t.csv", &key, "tags", &strings(&["x"])).unwrap();
        assert_eq!(report.updated[0][2], r#"["x", "y"]"#);
        assert_eq!(read(&dir), "id,name,tags\n1,a,\"[\"\"x\"\", \"\"y\"\"]\"\n2,b,\n");
    }

    #[test]
    fn test_merge_same_value_twice_is_stable() {
        let (dir, merger) = fixture("filename,quality\nimg1.jpg,\n");
        let key = MatchKey::new().with("filename", "img1.jpg");

        merger.merge_into("t.csv", &key, "quality", &strings(&["high"])).unwrap();
        let once = read(&dir);
        merger.merge_into("t.csv", &key, "quality", &strings(&["high"])).unwrap();
        assert_eq!(read(&dir), once);
        assert_eq!(once, "filename,quality\nimg1.jpg,high\n");
    }

    #[test]
    fn test_merge_without_match_leaves_file_untouched() {
        let content = "latitude;longitude;address\n55.1;37.2;\n";
        let (dir, merger) = fixture(content);
        let key = MatchKey::new().with("latitude", "0").with("longitude", "37.2");

        let report = merger
            .merge_into("t.csv", &key, "address", &strings(&["Moscow"]))
            .unwrap();

        assert!(report.is_noop());
        assert_eq!(read(&dir), content);
    }

    #[test]
    fn test_merge_matches_all_key_pairs_trimmed() {
        let (dir, merger) = fixture("latitude;longitude;address\n 55.1 ;37.2;\n55.1;0;\n");
        let key = MatchKey::new().with("latitude", "55.1").with("longitude", " 37.2");

        let report = merger
            .merge_into("t.csv", &key, "address", &strings(&["Россия, Москва"]))
            .unwrap();

        assert_eq!(report.updated.len(), 1);
        assert_eq!(
            read(&dir),
            "latitude;longitude;address\n 55.1 ;37.2;Россия, Москва\n55.1;0;\n"
        );
    }

    #[test]
    fn test_merge_treats_plain_cell_as_single_item() {
        let (dir, merger) = fixture("id,address\n1,\"Moscow, Tverskaya 1\"\n");
        let key = MatchKey::new().with("id", "1");

        merger
            .merge_into("t.csv", &key, "address", &strings(&["Moscow, Tverskaya 1", "Moscow"]))
            .unwrap();

        assert_eq!(
            read(&dir),
            "id,address\n1,\"[\"\"Moscow, Tverskaya 1\"\", \"\"Moscow\"\"]\"\n"
        );
    }

    #[test]
    fn test_merge_pads_short_rows_and_truncates_long_ones() {
        let (dir, merger) = fixture("id,name\n1\n2,b,stray\n");
        let key = MatchKey::new().with("id", "2");

        merger.merge_into("t.csv", &key, "tags", &strings(&["t"])).unwrap();

        assert_eq!(read(&dir), "id,name,tags\n1,,\n2,b,t\n");
    }

    #[test]
    fn test_merge_joined_encoding() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t.csv"), "id,tags\n1,x\n").unwrap();
        let config = Config {
            set_encoding: SetEncoding::Joined,
            ..Config::with_data_dir(dir.path())
        };

        CellMerger::new(config)
            .merge_into("t.csv", &MatchKey::new().with("id", "1"), "tags", &strings(&["y"]))
            .unwrap();

        assert_eq!(read(&dir), "id,tags\n1,x | y\n");
    }

    #[test]
    fn test_merge_joined_encoding_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t.csv"), "id,tags\n1,\n").unwrap();
        let merger = CellMerger::new(Config {
            set_encoding: SetEncoding::Joined,
            ..Config::with_data_dir(dir.path())
        });
        let key = MatchKey::new().with("id", "1");

        merger.merge_into("t.csv", &key, "tags", &strings(&["x", "y"])).unwrap();
        let once = read(&dir);
        merger.merge_into("t.csv", &key, "tags", &strings(&["x", "y"])).unwrap();

        assert_eq!(once, "id,tags\n1,x | y\n");
        assert_eq!(read(&dir), once);
    }

    #[test]
    fn test_merge_semicolon_table_with_quoted_commas() {
        let (dir, merger) = fixture("id;address\n1;\"Россия, Москва, Тверская, 1\"\n");

        let report = merger
            .merge_into("t.csv", &MatchKey::new().with("id", "1"), "quality", &strings(&["high"]))
            .unwrap();

        assert_eq!(report.updated.len(), 1);
        assert_eq!(
            read(&dir),
            "id;address;quality\n1;Россия, Москва, Тверская, 1;high\n"
        );
    }

    #[test]
    fn test_merge_rejects_non_csv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t.txt"), "id\n1\n").unwrap();
        let merger = CellMerger::new(Config::with_data_dir(dir.path()));

        assert!(matches!(
            merger.merge_into("t.txt", &MatchKey::new(), "tags", &strings(&["x"])),
            Err(Error::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            merger.merge_into("gone.csv", &MatchKey::new(), "tags", &strings(&["x"])),
            Err(Error::FileNotFound(_))
        ));
    }
}
