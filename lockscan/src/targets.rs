use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// A package flagged for detection at one exact version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPackage {
    pub name: String,
    pub version: String,
}

/// The packages an audit looks for.
///
/// Names are unique; inserting a name twice keeps the later version.
/// Always constructed explicitly and passed into the auditor, so tests
/// can run against alternate sets.
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    packages: Vec<TargetPackage>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, version: impl Into<String>) {
        let name = name.into();
        let version = version.into();
        if let Some(existing) = self.packages.iter_mut().find(|p| p.name == name) {
            existing.version = version;
        } else {
            self.packages.push(TargetPackage { name, version });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetPackage> {
        self.packages.iter()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// The flagged releases this audit was originally written to hunt down.
    pub fn builtin() -> Self {
        let mut set = Self::new();
        for (name, version) in [
            ("@accordproject/concerto-analysis", "3.24.1"),
            ("@accordproject/concerto-linter", "3.24.1"),
            ("@accordproject/concerto-linter-default-ruleset", "3.24.1"),
            ("@accordproject/concerto-metamodel", "3.12.5"),
            ("@accordproject/markdown-it-cicero", "0.16.26"),
        ] {
            set.insert(name, version);
        }
        set
    }

    /// Load a target set from a JSON file.
    ///
    /// Accepts either `{"<name>": "<version>", ...}` or a list of
    /// `{"name": ..., "version": ...}` records.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read target file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("failed to parse target file {}", path.display()))
    }

    fn from_json(text: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Record {
            name: String,
            version: String,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum TargetFile {
            Records(Vec<Record>),
            Map(serde_json::Map<String, serde_json::Value>),
        }

        let parsed: TargetFile = serde_json::from_str(text)?;

        let mut set = Self::new();
        match parsed {
            TargetFile::Records(records) => {
                for record in records {
                    set.insert(record.name, record.version);
                }
            }
            TargetFile::Map(map) => {
                for (name, version) in map {
                    let version = version
                        .as_str()
                        .with_context(|| format!("target '{name}' has a non-string version"))?;
                    set.insert(name, version);
                }
            }
        }
        Ok(set)
    }
}
