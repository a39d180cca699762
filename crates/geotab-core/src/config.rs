//! Runtime configuration shared by the table components
//!
//! A `Config` is built once (defaulted or loaded from JSON) and handed to each
//! component at construction. There is no global state: two components built
//! from different configs never see each other's settings.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default number of bytes inspected when sniffing a CSV delimiter
pub const DEFAULT_SAMPLE_BYTES: usize = 4096;

/// Default number of data rows returned by a read
pub const DEFAULT_AMOUNT: usize = 10_000;

/// How a merged set with two or more items is stored in a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetEncoding {
    /// JSON array of strings, e.g. `["a", "b"]`
    #[default]
    Json,
    /// Items joined with `" | "`, split on the same separator when read back
    Joined,
}

/// Settings for the table components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory that relative table paths are resolved against
    pub data_dir: Option<PathBuf>,
    /// Bytes sampled from the start of a CSV file for delimiter detection
    pub sample_bytes: usize,
    /// Row window used when a read does not specify one
    pub default_amount: usize,
    /// Encoding for multi-value cells written by the merger
    pub set_encoding: SetEncoding,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            sample_bytes: DEFAULT_SAMPLE_BYTES,
            default_amount: DEFAULT_AMOUNT,
            set_encoding: SetEncoding::Json,
        }
    }
}

impl Config {
    /// Create a config rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    /// Load a config from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the config to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Resolve a table path: relative paths are joined onto `data_dir` when one is set
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        match &self.data_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Resolve a path that must name an existing file
    pub fn existing_file<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let raw = path.as_ref();
        if raw.as_os_str().is_empty() {
            return Err(Error::InvalidPath(String::new()));
        }

        let resolved = self.resolve(raw);
        if resolved.is_dir() {
            return Err(Error::InvalidPath(resolved.display().to_string()));
        }
        if !resolved.exists() {
            return Err(Error::FileNotFound(resolved));
        }
        Ok(resolved)
    }
}
