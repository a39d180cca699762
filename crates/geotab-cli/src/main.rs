//! geotab CLI
//!
//! Command-line tool for reading, normalizing and backfilling photo-metadata tables.

use clap::{Parser, Subcommand};
use geotab_core::{
    parse_csv_str, run_pipeline, scan_tables, CellMerger, Config, Error, HeaderNormalizer, MatchKey,
    PipelineFile, ReadQuery, RowEditor, Step, SynonymMap, TableCleaner, TableReader, TableWriter,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geotab")]
#[command(about = "Photo metadata table toolkit", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory that relative table paths are resolved against
    #[arg(long, global = true, env = "GEOTAB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a table, optionally filtered or projected
    Read {
        /// Table file
        file: PathBuf,

        /// Data rows to skip
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Maximum rows to return
        #[arg(long)]
        amount: Option<usize>,

        /// Column to project, or to filter on with --value
        #[arg(short, long)]
        column: Option<String>,

        /// Value the column must match
        #[arg(short, long, requires = "column")]
        value: Option<String>,

        /// Column projected from the filtered rows
        #[arg(short, long, requires = "value")]
        project: Option<String>,

        /// Header for a headerless file (comma-separated)
        #[arg(long)]
        header: Option<String>,

        /// Output format (json or csv)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Append rows to an existing table
    Append {
        /// Target table
        file: PathBuf,

        /// Column names of the given rows (comma-separated)
        #[arg(long, required_unless_present = "from")]
        head: Option<String>,

        /// A row of values (comma-separated, CSV quoting allowed)
        #[arg(long, requires = "head")]
        row: Vec<String>,

        /// Append every row of this table instead
        #[arg(long, conflicts_with = "head")]
        from: Option<PathBuf>,
    },

    /// Write a copy of a table with canonical columns
    Normalize {
        /// Source table
        input: PathBuf,

        /// Synonym map (JSON object of canonical column to aliases)
        #[arg(short, long)]
        synonyms: PathBuf,

        /// Output path (.csv is appended when missing)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Merge values into a column of matching rows
    Merge {
        /// Target CSV table
        file: PathBuf,

        /// Match condition (column=value), repeatable
        #[arg(short, long)]
        key: Vec<String>,

        /// Column receiving the values
        #[arg(short, long)]
        column: String,

        /// Value to merge, repeatable
        #[arg(long = "value", required = true)]
        values: Vec<String>,
    },

    /// Overwrite cells of rows selected by a column value
    Edit {
        /// Target table
        file: PathBuf,

        /// Column used to find rows
        #[arg(short, long)]
        column: String,

        /// Value the column must match
        #[arg(short, long)]
        value: String,

        /// Columns being written (comma-separated)
        #[arg(long)]
        head: String,

        /// Replacement row, repeatable
        #[arg(long, required = true)]
        row: Vec<String>,
    },

    /// Copy a table without rows whose key cell is blank
    DropBlank {
        input: PathBuf,

        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Copy a table with merged sets collapsed to their first value
    Collapse {
        input: PathBuf,

        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// List table files under directories
    List {
        /// Directories to scan (defaults to the data directory)
        #[arg(short, long)]
        root: Vec<PathBuf>,
    },

    /// Run a pipeline file
    Run {
        /// Path to pipeline file (JSON)
        pipeline: PathBuf,
    },

    /// Create a pipeline file template
    CreatePipeline {
        /// Output path for the pipeline file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("GEOTAB_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> geotab_core::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.data_dir)?;

    match cli.command {
        Commands::Read {
            file,
            start,
            amount,
            column,
            value,
            project,
            header,
            format,
        } => {
            let amount = amount.unwrap_or(config.default_amount);
            let mut query = ReadQuery::default().window(start, amount);
            query.column_key = column;
            query.field_value = value;
            query.second_column_key = project;
            if let Some(header) = header {
                query = query.with_header(parse_row(&header)?);
            }
            cmd_read(&config, &file, &query, &format)
        }
        Commands::Append { file, head, row, from } => cmd_append(&config, &file, head, &row, from),
        Commands::Normalize {
            input,
            synonyms,
            output,
        } => cmd_normalize(&config, &input, &synonyms, &output),
        Commands::Merge {
            file,
            key,
            column,
            values,
        } => cmd_merge(&config, &file, &key, &column, &values),
        Commands::Edit {
            file,
            column,
            value,
            head,
            row,
        } => cmd_edit(&config, &file, &column, &value, &head, &row),
        Commands::DropBlank { input, key, output } => {
            let written = TableCleaner::new(config).drop_blank(&input, &key, &output)?;
            println!("Wrote {}", written.display());
            Ok(())
        }
        Commands::Collapse { input, key, output } => {
            let written = TableCleaner::new(config).collapse_sets(&input, &key, &output)?;
            println!("Wrote {}", written.display());
            Ok(())
        }
        Commands::List { root } => cmd_list(&config, &root),
        Commands::Run { pipeline } => cmd_run(&config, &pipeline),
        Commands::CreatePipeline { output } => cmd_create_pipeline(&output),
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> geotab_core::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if data_dir.is_some() {
        config.data_dir = data_dir;
    }
    debug!("using {:?}", config);
    Ok(config)
}

fn cmd_read(config: &Config, file: &Path, query: &ReadQuery, format: &str) -> geotab_core::Result<()> {
    let outcome = TableReader::new(config.clone()).read(file, query)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match format.to_lowercase().as_str() {
        "json" => {
            let json = serde_json::json!({
                "header": outcome.table.header(),
                "rows": outcome.table.records(),
                "_log": outcome.log_line(),
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        "csv" => {
            write_csv(out, &outcome.table.header(), &outcome.table.records()).map_err(|e| Error::Csv {
                path: file.to_path_buf(),
                source: e,
            })?;
            if let Some(log) = outcome.log_line() {
                eprintln!("{}", log);
            }
        }
        other => {
            return Err(Error::InvalidArgument(format!(
                "unknown format '{}', supported formats: json, csv",
                other
            )));
        }
    }

    Ok(())
}

fn cmd_append(
    config: &Config,
    file: &Path,
    head: Option<String>,
    rows: &[String],
    from: Option<PathBuf>,
) -> geotab_core::Result<()> {
    let writer = TableWriter::new(config.clone());

    let table = match (from, head) {
        (Some(source), _) => writer.append_table(file, source)?,
        (None, Some(head)) => {
            let head = parse_row(&head)?;
            let rows = rows.iter().map(|r| parse_row(r)).collect::<geotab_core::Result<Vec<_>>>()?;
            writer.append(file, &head, &rows)?
        }
        (None, None) => {
            return Err(Error::InvalidArgument("either --head or --from is required".to_string()));
        }
    };

    println!("{} now holds {} rows", file.display(), table.row_count());
    Ok(())
}

fn cmd_normalize(config: &Config, input: &Path, synonyms: &Path, output: &Path) -> geotab_core::Result<()> {
    let synonyms = SynonymMap::load(synonyms)?;
    println!(
        "Loaded {} canonical columns: {}",
        synonyms.len(),
        synonyms.canonical_names().join(", ")
    );

    let written = HeaderNormalizer::new(config.clone()).normalize(input, &synonyms, output)?;
    println!("Wrote {}", written.display());
    Ok(())
}

fn cmd_merge(
    config: &Config,
    file: &Path,
    keys: &[String],
    column: &str,
    values: &[String],
) -> geotab_core::Result<()> {
    let key = keys.iter().try_fold(MatchKey::new(), |key, pair| {
        let (column, value) = parse_pair(pair)?;
        Ok::<_, Error>(key.with(column, value))
    })?;

    let report = CellMerger::new(config.clone()).merge_into(file, &key, column, values)?;

    if report.is_noop() {
        println!("No rows matched; {} left unchanged", file.display());
        return Ok(());
    }

    println!("Updated {} rows:", report.updated.len());
    println!("{}", report.header.join("\t"));
    for row in &report.updated {
        println!("{}", row.join("\t"));
    }
    Ok(())
}

fn cmd_edit(
    config: &Config,
    file: &Path,
    column: &str,
    value: &str,
    head: &str,
    rows: &[String],
) -> geotab_core::Result<()> {
    let head = parse_row(head)?;
    let rows = rows.iter().map(|r| parse_row(r)).collect::<geotab_core::Result<Vec<_>>>()?;

    let table = RowEditor::new(config.clone()).edit_rows(file, column, value, &head, &rows)?;
    println!(
        "Edited {} ({} columns, {} rows)",
        file.display(),
        table.column_count(),
        table.row_count()
    );
    Ok(())
}

fn cmd_list(config: &Config, roots: &[PathBuf]) -> geotab_core::Result<()> {
    let roots = if roots.is_empty() {
        let data_dir = config
            .data_dir
            .clone()
            .ok_or_else(|| Error::InvalidArgument("no --root given and no data directory set".to_string()))?;
        vec![data_dir]
    } else {
        roots.to_vec()
    };

    let result = scan_tables(&roots)?;

    println!("Tables ({}):", result.total_files());
    for table in &result.tables {
        println!("  {} [{:?}]", table.path.display(), table.format);
    }

    Ok(())
}

fn cmd_run(config: &Config, pipeline_path: &Path) -> geotab_core::Result<()> {
    let pipeline = PipelineFile::load(pipeline_path)?;
    println!("Running pipeline with {} steps", pipeline.steps.len());

    let report = run_pipeline(config, &pipeline);

    for outcome in &report.outcomes {
        let status = if outcome.ok { "ok" } else { "FAILED" };
        println!("  {}. {} [{}] {}", outcome.index + 1, outcome.op, status, outcome.detail);
    }

    let failed = report.failures().count();
    println!();
    println!(
        "Pipeline finished in {} ms: {} ok, {} failed",
        (report.finished_at - report.started_at).num_milliseconds(),
        report.outcomes.len() - failed,
        failed
    );

    Ok(())
}

fn cmd_create_pipeline(output: &Path) -> geotab_core::Result<()> {
    let mut pipeline = PipelineFile::new();
    pipeline.push(Step::Normalize {
        input: PathBuf::from("raw_export.csv"),
        synonyms: SynonymMap::new()
            .with("filename", ["FileName", "File Name"])
            .with("latitude", ["GPSLatitude", "lat"])
            .with("longitude", ["GPSLongitude", "lon"]),
        output: PathBuf::from("normalized"),
    });
    pipeline.push(Step::AppendTable {
        target: PathBuf::from("database001.csv"),
        source: PathBuf::from("normalized.csv"),
    });
    pipeline.push(Step::Merge {
        target: PathBuf::from("database001.csv"),
        key: MatchKey::new().with("latitude", "55.7558").with("longitude", "37.6173"),
        column: "address".to_string(),
        values: vec!["Moscow".to_string()],
    });

    pipeline.save(output)?;
    println!("Created pipeline file: {}", output.display());
    println!("Steps: {}", pipeline.steps.len());
    println!();
    println!("Edit the file to describe your workflow, then run:");
    println!("  geotab run {}", output.display());

    Ok(())
}

fn write_csv<W: Write>(out: W, header: &[String], records: &[Vec<String>]) -> csv::Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);
    writer.write_record(header)?;
    for record in records {
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse one comma-separated line, honoring CSV quoting
fn parse_row(line: &str) -> geotab_core::Result<Vec<String>> {
    let records = parse_csv_str(line, b',').map_err(|e| Error::InvalidArgument(format!("bad row '{}': {}", line, e)))?;
    match records.as_slice() {
        [] => Ok(vec![String::new()]),
        [record] => Ok(record.clone()),
        _ => Err(Error::InvalidArgument(format!("row '{}' spans several lines", line))),
    }
}

/// Parse a `column=value` match condition
fn parse_pair(pair: &str) -> geotab_core::Result<(String, String)> {
    pair.split_once('=')
        .map(|(column, value)| (column.to_string(), value.to_string()))
        .ok_or_else(|| Error::InvalidArgument(format!("expected column=value, got '{}'", pair)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_row() {
        assert_eq!(parse_row("a,b").unwrap(), vec!["a", "b"]);
        assert_eq!(parse_row("1,\"Moscow, Tverskaya 1\"").unwrap(), vec!["1", "Moscow, Tverskaya 1"]);
        assert_eq!(parse_row("").unwrap(), vec![""]);
        assert!(parse_row("a\nb").is_err());
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            parse_pair("filename=img=1.jpg").unwrap(),
            ("filename".to_string(), "img=1.jpg".to_string())
        );
        assert!(parse_pair("filename").is_err());
    }

    #[test]
    fn test_load_config_data_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        Config::with_data_dir("/srv/tables").save(&path).unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/tables")));

        let config = load_config(Some(&path), Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.data_dir, Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_write_csv_quotes_sets() {
        let mut out = Vec::new();
        write_csv(
            &mut out,
            &["id".to_string(), "tags".to_string()],
            &[vec!["1".to_string(), r#"["x", "y"]"#.to_string()]],
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "id,tags\n1,\"[\"\"x\"\", \"\"y\"\"]\"\n");
    }

    #[test]
    fn test_cli_parses_merge() {
        let cli = Cli::try_parse_from([
            "geotab", "merge", "db.csv", "--key", "latitude=55.1", "--key", "longitude=37.2", "--column",
            "address", "--value", "Moscow",
        ])
        .unwrap();
        match cli.command {
            Commands::Merge { key, values, .. } => {
                assert_eq!(key.len(), 2);
                assert_eq!(values, vec!["Moscow"]);
            }
            _ => panic!("expected merge"),
        }
    }
}
