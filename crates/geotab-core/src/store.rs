//! Atomic persistence of tables
//!
//! Every rewrite goes to a temporary file in the target's directory and is
//! then renamed over the target. A failure at any point drops the temporary
//! file, leaving the original untouched.

use crate::error::{Error, Result};
use crate::parser::{self, TableFormat};
use rust_xlsxwriter::Workbook;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Write a table in `format`, replacing `path` atomically
pub fn write_table(
    path: &Path,
    format: TableFormat,
    header: &[String],
    rows: &[Vec<String>],
    delimiter: u8,
) -> Result<()> {
    match format {
        TableFormat::Csv => write_csv(path, header, rows, delimiter),
        TableFormat::Spreadsheet => write_spreadsheet(path, header, rows),
    }
}

/// Write delimited text, replacing `path` atomically
pub fn write_csv(path: &Path, header: &[String], rows: &[Vec<String>], delimiter: u8) -> Result<()> {
    let mut tmp = temp_beside(path)?;

    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_writer(tmp.as_file_mut());

        let csv_err = |e: csv::Error| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        };
        writer.write_record(header).map_err(csv_err)?;
        for row in rows {
            writer.write_record(row).map_err(csv_err)?;
        }
        writer.flush()?;
    }

    tmp.as_file().sync_all()?;
    persist(tmp, path)
}

/// Write an `.xlsx` workbook with one sheet, replacing `path` atomically
pub fn write_spreadsheet(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    if parser::extension_of(path) != "xlsx" {
        return Err(parser::unsupported(path));
    }

    let xlsx_err = |e: rust_xlsxwriter::XlsxError| Error::SpreadsheetWrite {
        path: path.to_path_buf(),
        source: e,
    };

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    for (row_idx, record) in std::iter::once(header).chain(rows.iter().map(Vec::as_slice)).enumerate() {
        let row_num = u32::try_from(row_idx)
            .map_err(|_| Error::InvalidArgument(format!("too many rows for {}", path.display())))?;
        for (col_idx, value) in record.iter().enumerate() {
            let col_num = u16::try_from(col_idx).map_err(|_| {
                Error::InvalidArgument(format!("too many columns for {}", path.display()))
            })?;
            worksheet
                .write_string(row_num, col_num, value.as_str())
                .map_err(xlsx_err)?;
        }
    }

    let mut tmp = temp_beside(path)?;
    let buffer = workbook.save_to_buffer().map_err(xlsx_err)?;
    tmp.write_all(&buffer)?;
    tmp.as_file().sync_all()?;
    persist(tmp, path)
}

fn temp_beside(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(tempfile::Builder::new()
        .prefix(".geotab-")
        .suffix(".tmp")
        .tempfile_in(dir)?)
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<()> {
    debug!("replacing {} from {}", path.display(), tmp.path().display());
    tmp.persist(path).map_err(|e| Error::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
