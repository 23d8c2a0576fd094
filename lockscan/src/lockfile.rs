use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::report::Match;
use crate::targets::TargetSet;

/// Lockfile formats the audit understands.
///
/// The tag is assigned once, when a path is discovered in a repository
/// tree; downstream code dispatches on the variant instead of re-checking
/// filename suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockfileFormat {
    /// npm `package-lock.json`
    PackageLock,
    /// pnpm `pnpm-lock.yaml`
    PnpmLock,
}

/// Recognized lockfile filename suffixes and the format each maps to.
const LOCKFILE_SUFFIXES: &[(&str, LockfileFormat)] = &[
    ("package-lock.json", LockfileFormat::PackageLock),
    ("pnpm-lock.yaml", LockfileFormat::PnpmLock),
];

impl LockfileFormat {
    /// Detect the format from a path inside a repository tree, or `None`
    /// for paths that are not recognized lockfiles.
    pub fn from_path(path: &str) -> Option<Self> {
        LOCKFILE_SUFFIXES
            .iter()
            .find(|(suffix, _)| path.ends_with(suffix))
            .map(|(_, format)| *format)
    }
}

/// `package-lock.json`: `packages` maps `"node_modules/<name>"` keys to
/// entries carrying the resolved version.
#[derive(Debug, Deserialize)]
pub struct PackageLockDoc {
    #[serde(default)]
    packages: BTreeMap<String, PackageLockEntry>,
}

#[derive(Debug, Deserialize)]
struct PackageLockEntry {
    version: Option<String>,
}

/// `pnpm-lock.yaml`: `packages` maps composite `"[/]<name>@<version>"`
/// keys to arbitrary entry metadata, which the scan never inspects.
#[derive(Debug, Deserialize)]
pub struct PnpmLockDoc {
    #[serde(default)]
    packages: BTreeMap<String, serde_yaml::Value>,
}

/// A parsed lockfile, tagged by the format it was decoded from.
#[derive(Debug)]
pub enum Lockfile {
    PackageLock(PackageLockDoc),
    PnpmLock(PnpmLockDoc),
}

impl Lockfile {
    /// Parse lockfile text according to `format`.
    pub fn parse(format: LockfileFormat, text: &str) -> Result<Self> {
        match format {
            LockfileFormat::PackageLock => {
                let doc = serde_json::from_str(text).context("invalid package-lock.json")?;
                Ok(Lockfile::PackageLock(doc))
            }
            LockfileFormat::PnpmLock => {
                let doc = serde_yaml::from_str(text).context("invalid pnpm-lock.yaml")?;
                Ok(Lockfile::PnpmLock(doc))
            }
        }
    }

    /// Extract every target package pinned at exactly its flagged version.
    ///
    /// Pure over the parsed document; comparison is exact string equality,
    /// never a semver range.
    pub fn matches(&self, targets: &TargetSet) -> Vec<Match> {
        match self {
            Lockfile::PackageLock(doc) => doc.matches(targets),
            Lockfile::PnpmLock(doc) => doc.matches(targets),
        }
    }
}

impl PackageLockDoc {
    fn matches(&self, targets: &TargetSet) -> Vec<Match> {
        targets
            .iter()
            .filter_map(|target| {
                let entry = self.packages.get(&format!("node_modules/{}", target.name))?;
                let version = entry.version.as_deref()?;
                (version == target.version).then(|| Match {
                    package: target.name.clone(),
                    version: version.to_string(),
                })
            })
            .collect()
    }
}

impl PnpmLockDoc {
    fn matches(&self, targets: &TargetSet) -> Vec<Match> {
        // Key order is lexicographic, so repeated scans of the same
        // document produce identical match sequences.
        let mut found = Vec::new();
        for key in self.packages.keys() {
            let Some((name, version)) = split_pnpm_key(key) else {
                continue;
            };
            if targets.iter().any(|t| t.name == name && t.version == version) {
                found.push(Match {
                    package: name.to_string(),
                    version: version.to_string(),
                });
            }
        }
        found
    }
}

/// Split a pnpm `packages` key into (name, version).
///
/// Keys look like `/name@version`, `name@version`, or `/@scope/name@version`.
/// The version may itself contain `@` and `/` (peer-dependency suffixes),
/// so the split happens at the first `@` after the possibly-scoped name
/// rather than at the last `@` in the key.
pub fn split_pnpm_key(key: &str) -> Option<(&str, &str)> {
    let key = key.strip_prefix('/').unwrap_or(key);

    // A scoped name keeps its leading `@`; the separator search starts
    // after the scope's `/`.
    let search_from = if key.starts_with('@') {
        key.find('/')? + 1
    } else {
        0
    };

    let at = key[search_from..].find('@')? + search_from;
    if at == 0 || at + 1 == key.len() {
        return None;
    }
    Some((&key[..at], &key[at + 1..]))
}
