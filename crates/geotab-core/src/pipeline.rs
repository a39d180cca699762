//! Pipeline files: a JSON list of table operations run in order
//!
//! A pipeline describes one pass of the photo-metadata workflow, e.g.
//! normalize a raw export, append it to the main table, then merge derived
//! addresses into it. Every step runs even when an earlier one fails; the
//! [`PipelineReport`] records what happened to each.

use crate::cleaner::TableCleaner;
use crate::config::Config;
use crate::editor::RowEditor;
use crate::error::{Error, Result};
use crate::merger::CellMerger;
use crate::normalizer::{HeaderNormalizer, SynonymMap};
use crate::table::MatchKey;
use crate::writer::TableWriter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// One table operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Rewrite `input` into canonical columns at `output`
    Normalize {
        input: PathBuf,
        synonyms: SynonymMap,
        output: PathBuf,
    },
    /// Append literal rows laid out as `head`
    Append {
        target: PathBuf,
        head: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// Append every row of another table
    AppendTable { target: PathBuf, source: PathBuf },
    /// Merge values into a column of rows matching `key`
    Merge {
        target: PathBuf,
        key: MatchKey,
        column: String,
        values: Vec<String>,
    },
    /// Overwrite cells of rows where `column_key` equals `value`
    Edit {
        target: PathBuf,
        column_key: String,
        value: String,
        head: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// Copy `input` without rows whose `key` cell is blank
    DropBlank {
        input: PathBuf,
        key: String,
        output: PathBuf,
    },
    /// Copy `input` with merged sets in `key` collapsed to one value
    CollapseSets {
        input: PathBuf,
        key: String,
        output: PathBuf,
    },
}

impl Step {
    /// Operation name as written in the pipeline file
    pub fn op(&self) -> &'static str {
        match self {
            Step::Normalize { .. } => "normalize",
            Step::Append { .. } => "append",
            Step::AppendTable { .. } => "append_table",
            Step::Merge { .. } => "merge",
            Step::Edit { .. } => "edit",
            Step::DropBlank { .. } => "drop_blank",
            Step::CollapseSets { .. } => "collapse_sets",
        }
    }
}

/// A pipeline file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineFile {
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl PipelineFile {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step
    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Load a pipeline file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the pipeline file to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// What happened to one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Position in the pipeline, starting at 0
    pub index: usize,
    /// Operation name
    pub op: String,
    /// Whether the step succeeded
    pub ok: bool,
    /// Summary on success, error message on failure
    pub detail: String,
}

/// Result of running a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<StepOutcome>,
}

impl PipelineReport {
    /// Outcomes of steps that failed
    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.iter().filter(|o| !o.ok)
    }

    /// True when every step succeeded
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.ok)
    }
}

/// Run every step of `pipeline` in order
pub fn run_pipeline(config: &Config, pipeline: &PipelineFile) -> PipelineReport {
    let started_at = Utc::now();
    info!("running pipeline with {} steps", pipeline.steps.len());

    let outcomes = pipeline
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let (ok, detail) = match run_step(config, step) {
                Ok(detail) => {
                    info!("step {} ({}): {}", index, step.op(), detail);
                    (true, detail)
                }
                Err(e) => {
                    error!("step {} ({}) failed: {}", index, step.op(), e);
                    (false, e.to_string())
                }
            };
            StepOutcome {
                index,
                op: step.op().to_string(),
                ok,
                detail,
            }
        })
        .collect();

    PipelineReport {
        started_at,
        finished_at: Utc::now(),
        outcomes,
    }
}

fn run_step(config: &Config, step: &Step) -> Result<String> {
    match step {
        Step::Normalize {
            input,
            synonyms,
            output,
        } => {
            let written = HeaderNormalizer::new(config.clone()).normalize(input, synonyms, output)?;
            Ok(format!("wrote {}", written.display()))
        }
        Step::Append { target, head, rows } => {
            let table = TableWriter::new(config.clone()).append(target, head, rows)?;
            Ok(format!("{} rows in table", table.row_count()))
        }
        Step::AppendTable { target, source } => {
            let table = TableWriter::new(config.clone()).append_table(target, source)?;
            Ok(format!("{} rows in table", table.row_count()))
        }
        Step::Merge {
            target,
            key,
            column,
            values,
        } => {
            let report = CellMerger::new(config.clone()).merge_into(target, key, column, values)?;
            Ok(format!("{} rows updated", report.updated.len()))
        }
        Step::Edit {
            target,
            column_key,
            value,
            head,
            rows,
        } => {
            RowEditor::new(config.clone()).edit_rows(target, column_key, value, head, rows)?;
            Ok(format!("edited rows where {} == {}", column_key, value))
        }
        Step::DropBlank { input, key, output } => {
            let written = TableCleaner::new(config.clone()).drop_blank(input, key, output)?;
            Ok(format!("wrote {}", written.display()))
        }
        Step::CollapseSets { input, key, output } => {
            let written = TableCleaner::new(config.clone()).collapse_sets(input, key, output)?;
            Ok(format!("wrote {}", written.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pipeline_file_json_shape() {
        let json = r#"{
            "steps": [
                {"op": "merge", "target": "db.csv", "key": [["filename", "a.jpg"]],
                 "column": "address", "values": ["Moscow"]},
                {"op": "normalize", "input": "raw.csv",
                 "synonyms": {"filename": ["FileName"], "camera": ["Model"]},
                 "output": "norm"}
            ]
        }"#;

        let pipeline: PipelineFile = serde_json::from_str(json).unwrap();
        assert_eq!(pipeline.steps.len(), 2);
        assert_eq!(pipeline.steps[0].op(), "merge");
        match &pipeline.steps[1] {
            Step::Normalize { synonyms, .. } => {
                assert_eq!(synonyms.canonical_names(), strings(&["filename", "camera"]));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut pipeline = PipelineFile::new();
        pipeline.push(Step::DropBlank {
            input: PathBuf::from("db.csv"),
            key: "address".to_string(),
            output: PathBuf::from("clean.csv"),
        });

        pipeline.save(&path).unwrap();
        assert_eq!(PipelineFile::load(&path).unwrap(), pipeline);
    }

    #[test]
    fn test_run_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("db.csv"), "filename,camera\n").unwrap();
        fs::write(dir.path().join("raw.csv"), "FileName;Model\na.jpg;cam-a\n").unwrap();
        let config = Config::with_data_dir(dir.path());

        let mut pipeline = PipelineFile::new();
        pipeline.push(Step::Normalize {
            input: PathBuf::from("raw.csv"),
            synonyms: SynonymMap::new()
                .with("filename", ["FileName"])
                .with("camera", ["Model"]),
            output: PathBuf::from("norm"),
        });
        pipeline.push(Step::Merge {
            target: PathBuf::from("missing.csv"),
            key: MatchKey::new(),
            column: "address".to_string(),
            values: strings(&["x"]),
        });
        pipeline.push(Step::AppendTable {
            target: PathBuf::from("db.csv"),
            source: PathBuf::from("norm.csv"),
        });
        pipeline.push(Step::Merge {
            target: PathBuf::from("db.csv"),
            key: MatchKey::new().with("filename", "a.jpg"),
            column: "address".to_string(),
            values: strings(&["Moscow"]),
        });

        let report = run_pipeline(&config, &pipeline);

        assert!(!report.is_success());
        assert_eq!(report.failures().map(|o| o.index).collect::<Vec<_>>(), vec![1]);
        assert!(report.finished_at >= report.started_at);
        assert_eq!(report.outcomes[3].detail, "1 rows updated");
        assert_eq!(
            fs::read_to_string(dir.path().join("db.csv")).unwrap(),
            "filename,camera,address\na.jpg,cam-a,Moscow\n"
        );
    }
}
