//! Rewriting tables into a canonical header set
//!
//! A [`SynonymMap`] lists, for every canonical column, the header spellings
//! seen across sources (`"latitude": ["latitude", "широта", "lat"]`). The
//! normalizer keeps only the columns the map covers, in map order.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser;
use crate::store;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Aliases recognised for one canonical column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSynonyms {
    /// Column name written to the output
    pub canonical: String,
    /// Source header spellings, compared case-insensitively
    pub aliases: Vec<String>,
}

/// Ordered mapping from canonical column to aliases
///
/// Serialized as a JSON object; key order is the output column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynonymMap {
    entries: Vec<HeaderSynonyms>,
}

impl SynonymMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a canonical column with its aliases
    pub fn with<I, S>(mut self, canonical: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(canonical, aliases);
        self
    }

    /// Add aliases for a canonical column, extending it if already present
    pub fn insert<I, S>(&mut self, canonical: impl Into<String>, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let canonical = canonical.into();
        let aliases = aliases.into_iter().map(Into::into);
        match self.entries.iter_mut().find(|e| e.canonical == canonical) {
            Some(entry) => entry.aliases.extend(aliases),
            None => self.entries.push(HeaderSynonyms {
                canonical,
                aliases: aliases.collect(),
            }),
        }
    }

    /// Entries in output order
    pub fn entries(&self) -> &[HeaderSynonyms] {
        &self.entries
    }

    /// Canonical column names in output order
    pub fn canonical_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.canonical.clone()).collect()
    }

    /// Number of canonical columns
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no canonical column is defined
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a map from a JSON object file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        let map: SynonymMap = serde_json::from_str(&content)?;
        map.validate()?;
        Ok(map)
    }

    /// Save the map as a JSON object
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Fail if any alias belongs to two canonical columns
    pub fn validate(&self) -> Result<()> {
        self.alias_index().map(|_| ())
    }

    /// Lookup from normalized alias to entry index
    fn alias_index(&self) -> Result<HashMap<String, usize>> {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (entry_idx, entry) in self.entries.iter().enumerate() {
            for alias in &entry.aliases {
                let key = alias_key(alias);
                match index.get(&key) {
                    Some(&other) if other != entry_idx => {
                        return Err(Error::AmbiguousAlias {
                            alias: alias.clone(),
                            first: self.entries[other].canonical.clone(),
                            second: entry.canonical.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        index.insert(key, entry_idx);
                    }
                }
            }
        }
        Ok(index)
    }

    /// For each canonical column, the first `header` position whose name is one of its aliases
    pub fn source_columns(&self, header: &[String]) -> Result<Vec<Option<usize>>> {
        let index = self.alias_index()?;
        let mut sources = vec![None; self.entries.len()];
        for (col_idx, name) in header.iter().enumerate() {
            if let Some(&entry_idx) = index.get(&alias_key(name)) {
                if sources[entry_idx].is_none() {
                    sources[entry_idx] = Some(col_idx);
                }
            }
        }
        Ok(sources)
    }
}

fn alias_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Serialize for SynonymMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.canonical, &entry.aliases)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SynonymMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SynonymVisitor;

        impl<'de> Visitor<'de> for SynonymVisitor {
            type Value = SynonymMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping canonical columns to alias lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<SynonymMap, A::Error> {
                let mut map = SynonymMap::new();
                while let Some((canonical, aliases)) = access.next_entry::<String, Vec<String>>()? {
                    map.insert(canonical, aliases);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(SynonymVisitor)
    }
}

/// Produces canonical tables from arbitrary sources
#[derive(Debug, Clone)]
pub struct HeaderNormalizer {
    config: Config,
}

impl HeaderNormalizer {
    /// Create a normalizer
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Write a comma-delimited copy of `input` holding only the canonical columns
    ///
    /// Canonical columns without a matching source column are written empty.
    /// `.csv` is appended to `output` when missing. The input is never
    /// modified. Returns the path written.
    pub fn normalize<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        synonyms: &SynonymMap,
        output: Q,
    ) -> Result<PathBuf> {
        synonyms.validate()?;

        let input = self.config.existing_file(input)?;
        let (header, records) = parser::load_grid(&input, self.config.sample_bytes)?.split_header();

        let sources = synonyms.source_columns(&header)?;
        for (entry, source) in synonyms.entries().iter().zip(&sources) {
            if source.is_none() {
                warn!(
                    "no column of {} matches '{}', writing it empty",
                    input.display(),
                    entry.canonical
                );
            }
        }

        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|record| {
                sources
                    .iter()
                    .map(|source| {
                        source
                            .and_then(|i| record.get(i).cloned())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        let output = with_csv_extension(self.config.resolve(output));
        store::write_csv(&output, &synonyms.canonical_names(), &rows, b',')?;
        info!(
            "normalized {} rows from {} into {}",
            rows.len(),
            input.display(),
            output.display()
        );

        Ok(output)
    }
}

fn with_csv_extension(path: PathBuf) -> PathBuf {
    if path.to_string_lossy().ends_with(".csv") {
        return path;
    }
    let mut raw = path.into_os_string();
    raw.push(".csv");
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn headkeys() -> SynonymMap {
        SynonymMap::new()
            .with("filename", ["filename", "Имя файла", "file_name", "filepath"])
            .with("camera", ["camera", "устройство", "device"])
            .with("latitude", ["latitude", "широта"])
            .with("longitude", ["longitude", "долгота"])
            .with("address", ["address"])
    }

    #[test]
    fn test_normalize_maps_aliases_in_map_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("raw.csv"),
            "Широта;Имя файла;notes;Device\n55.1;img1.jpg;x;cam-a\n",
        )
        .unwrap();
        let normalizer = HeaderNormalizer::new(Config::with_data_dir(dir.path()));

        let out = normalizer.normalize("raw.csv", &headkeys(), "canonical").unwrap();

        assert_eq!(out, dir.path().join("canonical.csv"));
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "filename,camera,latitude,longitude,address\nimg1.jpg,cam-a,55.1,,\n"
        );
        // input untouched
        assert_eq!(
            fs::read_to_string(dir.path().join("raw.csv")).unwrap(),
            "Широта;Имя файла;notes;Device\n55.1;img1.jpg;x;cam-a\n"
        );
    }

    #[test]
    fn test_normalize_spreadsheet_input_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        crate::store::write_spreadsheet(
            &dir.path().join("raw.xlsx"),
            &strings(&["Device", "Имя файла", "долгота"]),
            &[strings(&["cam-a", "img1.jpg", "37.2"])],
        )
        .unwrap();
        let normalizer = HeaderNormalizer::new(Config::with_data_dir(dir.path()));

        let out = normalizer.normalize("raw.xlsx", &headkeys(), "canonical").unwrap();

        assert_eq!(out, dir.path().join("canonical.csv"));
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "filename,camera,latitude,longitude,address\nimg1.jpg,cam-a,,37.2,\n"
        );
    }

    #[test]
    fn test_normalize_without_matches_writes_empty_columns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("raw.csv"), "a,b\n1,2\n3,4\n").unwrap();
        let normalizer = HeaderNormalizer::new(Config::with_data_dir(dir.path()));

        let out = normalizer.normalize("raw.csv", &headkeys(), "out.csv").unwrap();

        assert_eq!(
            fs::read_to_string(out).unwrap(),
            "filename,camera,latitude,longitude,address\n,,,,\n,,,,\n"
        );
    }

    #[test]
    fn test_first_source_column_wins() {
        let map = SynonymMap::new().with("filename", ["filename", "filepath"]);
        let sources = map
            .source_columns(&strings(&["id", "FilePath", "filename"]))
            .unwrap();
        assert_eq!(sources, vec![Some(1)]);
    }

    #[test]
    fn test_ambiguous_alias_is_rejected() {
        let map = SynonymMap::new()
            .with("subject", ["object"])
            .with("camera", ["device", "OBJECT"]);

        let err = map.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::AmbiguousAlias { ref first, ref second, .. } if first == "subject" && second == "camera"
        ));
    }

    #[test]
    fn test_ambiguous_alias_fails_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("raw.csv"), "object\nx\n").unwrap();
        let normalizer = HeaderNormalizer::new(Config::with_data_dir(dir.path()));
        let map = SynonymMap::new().with("a", ["object"]).with("b", ["object"]);

        assert!(normalizer.normalize("raw.csv", &map, "out.csv").is_err());
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn test_synonym_map_json_keeps_key_order() {
        let json = r#"{"quality": ["quality"], "address": ["address", "адрес"], "camera": ["device"]}"#;
        let map: SynonymMap = serde_json::from_str(json).unwrap();
        assert_eq!(map.canonical_names(), strings(&["quality", "address", "camera"]));

        let round: SynonymMap = serde_json::from_str(&serde_json::to_string(&map).unwrap()).unwrap();
        assert_eq!(round, map);
    }

    #[test]
    fn test_insert_extends_existing_entry() {
        let mut map = SynonymMap::new().with("camera", ["camera"]);
        map.insert("camera", ["device"]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.entries()[0].aliases, strings(&["camera", "device"]));
    }

    #[test]
    fn test_with_csv_extension() {
        assert_eq!(with_csv_extension(PathBuf::from("out")), PathBuf::from("out.csv"));
        assert_eq!(with_csv_extension(PathBuf::from("out.csv")), PathBuf::from("out.csv"));
        assert_eq!(
            with_csv_extension(PathBuf::from("out.xlsx")),
            PathBuf::from("out.xlsx.csv")
        );
    }
}
