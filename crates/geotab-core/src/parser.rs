//! Loading CSV and spreadsheet files into raw string grids

use crate::error::{Error, Result};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Delimiters considered when sniffing a CSV sample, in tie-break order
pub const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// On-disk layout of a table file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableFormat {
    /// Delimited text (`.csv`, `.txt`)
    Csv,
    /// Workbook read through calamine, first sheet only
    Spreadsheet,
}

impl TableFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = extension_of(path);
        match ext.as_str() {
            "csv" | "txt" => Some(TableFormat::Csv),
            "xlsx" | "xlsm" | "xltx" | "xltm" | "xls" | "xlsb" | "ods" => {
                Some(TableFormat::Spreadsheet)
            }
            _ => None,
        }
    }

    /// Detect the format or fail with `UnsupportedFormat`
    pub fn require(path: &Path) -> Result<Self> {
        Self::from_path(path).ok_or_else(|| unsupported(path))
    }
}

/// Lowercased extension of `path`, empty when there is none
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

pub(crate) fn unsupported(path: &Path) -> Error {
    Error::UnsupportedFormat {
        path: path.to_path_buf(),
        extension: extension_of(path),
    }
}

/// Raw records of a table file before header resolution
#[derive(Debug, Clone)]
pub struct RawGrid {
    /// Every record in file order
    pub records: Vec<Vec<String>>,
    /// Delimiter detected for CSV files (`,` for spreadsheets)
    pub delimiter: u8,
    /// Format the grid was read from
    pub format: TableFormat,
}

impl RawGrid {
    /// Split off the header: the first record with a non-blank cell
    ///
    /// Blank records before it are dropped. Returns an empty header when the
    /// grid holds no such record.
    pub fn split_header(self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut records = self.records.into_iter().skip_while(|r| is_blank(r));
        match records.next() {
            Some(header) => (header, records.collect()),
            None => (Vec::new(), Vec::new()),
        }
    }
}

/// True when every cell is empty after trimming
pub fn is_blank(record: &[String]) -> bool {
    record.iter().all(|c| c.trim().is_empty())
}

/// Pick the most frequent candidate delimiter in `sample`, falling back to comma
///
/// Bytes inside double-quoted fields are not counted.
pub fn detect_delimiter(sample: &str) -> u8 {
    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;
    for b in sample.bytes() {
        if b == b'"' {
            // an escaped `""` toggles twice
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(i) = CANDIDATE_DELIMITERS.iter().position(|&c| c == b) {
                counts[i] += 1;
            }
        }
    }

    let mut best = (b',', 0usize);
    for (&candidate, &count) in CANDIDATE_DELIMITERS.iter().zip(&counts) {
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

/// Decode file bytes as UTF-8, stripping a BOM; invalid UTF-8 is read as Latin-1
pub fn decode_text(bytes: Vec<u8>, path: &Path) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("{} is not valid UTF-8, decoding as Latin-1", path.display());
            e.into_bytes().into_iter().map(char::from).collect()
        }
    };

    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Leading slice of `content` no longer than `max_bytes`, cut on a char boundary
fn sample_of(content: &str, max_bytes: usize) -> &str {
    let mut end = content.len().min(max_bytes);
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

/// Parse delimited text into records (useful for testing)
pub fn parse_csv_str(content: &str, delimiter: u8) -> std::result::Result<Vec<Vec<String>>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // Allow varying number of fields
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(records)
}

/// Load every record of a CSV or spreadsheet file
pub fn load_grid(path: &Path, sample_bytes: usize) -> Result<RawGrid> {
    match TableFormat::require(path)? {
        TableFormat::Csv => load_csv(path, sample_bytes),
        TableFormat::Spreadsheet => Ok(RawGrid {
            records: load_spreadsheet(path)?,
            delimiter: b',',
            format: TableFormat::Spreadsheet,
        }),
    }
}

fn load_csv(path: &Path, sample_bytes: usize) -> Result<RawGrid> {
    let bytes = fs::read(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let content = decode_text(bytes, path);

    let delimiter = detect_delimiter(sample_of(&content, sample_bytes));
    debug!(
        "detected delimiter {:?} for {}",
        char::from(delimiter),
        path.display()
    );

    let records = parse_csv_str(&content, delimiter).map_err(|e| Error::Csv {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(RawGrid {
        records,
        delimiter,
        format: TableFormat::Csv,
    })
}

fn load_spreadsheet(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| Error::Spreadsheet {
        path: path.to_path_buf(),
        source: e,
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::NoWorksheet(path.to_path_buf()))?
        .map_err(|e| Error::Spreadsheet {
            path: path.to_path_buf(),
            source: e,
        })?;

    // calamine trims leading empty columns; keep cells in their sheet column
    let first_col = range.start().map(|(_, col)| col as usize).unwrap_or(0);

    Ok(range
        .rows()
        .map(|row| {
            std::iter::repeat(String::new())
                .take(first_col)
                .chain(row.iter().map(spreadsheet_cell))
                .collect()
        })
        .collect())
}

/// Render a spreadsheet cell as the string stored in a table
pub fn spreadsheet_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt: chrono::NaiveDateTime| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| cell.to_string()),
        Data::Error(e) => format!("{e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TableFormat::from_path(Path::new("a.CSV")), Some(TableFormat::Csv));
        assert_eq!(TableFormat::from_path(Path::new("a.txt")), Some(TableFormat::Csv));
        assert_eq!(
            TableFormat::from_path(Path::new("a.xlsx")),
            Some(TableFormat::Spreadsheet)
        );
        assert_eq!(TableFormat::from_path(Path::new("a.json")), None);
        assert_eq!(TableFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3\n"), b';');
        assert_eq!(detect_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(detect_delimiter("a|b\n"), b'|');
        assert_eq!(detect_delimiter("a,b\n1,2\n"), b',');
        // nothing found falls back to comma
        assert_eq!(detect_delimiter("single\n"), b',');
        // ties keep candidate order
        assert_eq!(detect_delimiter("a;b,c\n"), b',');
    }

    #[test]
    fn test_detect_delimiter_ignores_quoted_fields() {
        assert_eq!(detect_delimiter("id;address\n1;\"a, b, c, d\"\n"), b';');
        assert_eq!(
            detect_delimiter("id;address\n1;\"Россия, Москва, \"\"Тверская\"\", 1\"\n"),
            b';'
        );
    }

    #[test]
    fn test_load_grid_semicolon_with_quoted_commas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "id;address\n1;\"Россия, Москва, Тверская, 1\"\n").unwrap();

        let (header, rows) = load_grid(&path, 4096).unwrap().split_header();
        assert_eq!(header, vec!["id".to_string(), "address".to_string()]);
        assert_eq!(
            rows,
            vec![vec!["1".to_string(), "Россия, Москва, Тверская, 1".to_string()]]
        );
    }

    #[test]
    fn test_sample_of_respects_char_boundary() {
        let content = "ши,ро";
        // 'ш' is two bytes; cutting at 1 must back off to 0
        assert_eq!(sample_of(content, 1), "");
        assert_eq!(sample_of(content, 100), content);
    }

    #[test]
    fn test_decode_text_strips_bom_and_falls_back() {
        let path = PathBuf::from("t.csv");
        assert_eq!(decode_text(b"\xEF\xBB\xBFid,name".to_vec(), &path), "id,name");
        assert_eq!(decode_text(b"caf\xE9".to_vec(), &path), "café");
    }

    #[test]
    fn test_parse_csv_str_flexible_and_quoted() {
        let records = parse_csv_str("id;name\n1;\"a;b\"\n2\n", b';').unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], vec!["1".to_string(), "a;b".to_string()]);
        assert_eq!(records[2], vec!["2".to_string()]);
    }

    #[test]
    fn test_split_header_skips_blank_records() {
        let grid = RawGrid {
            records: vec![
                vec![String::new(), " ".to_string()],
                vec!["id".to_string(), "name".to_string()],
                vec!["1".to_string(), "a".to_string()],
            ],
            delimiter: b',',
            format: TableFormat::Csv,
        };
        let (header, rows) = grid.split_header();
        assert_eq!(header, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_load_grid_detects_semicolon_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "filename;camera\nimg1.jpg;cam-a\n").unwrap();

        let grid = load_grid(&path, 4096).unwrap();
        assert_eq!(grid.delimiter, b';');
        assert_eq!(grid.format, TableFormat::Csv);
        assert_eq!(grid.records[1], vec!["img1.jpg".to_string(), "cam-a".to_string()]);
    }

    #[test]
    fn test_load_grid_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        fs::write(&path, "{}").unwrap();
        assert!(matches!(
            load_grid(&path, 4096),
            Err(Error::UnsupportedFormat { .. })
        ));
    }
}
