use serde::Serialize;

/// A confirmed occurrence of a target package at its flagged version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub package: String,
    pub version: String,
}

/// Matches found in a single lockfile.
#[derive(Debug, Clone, Serialize)]
pub struct LockfileMatches {
    pub path: String,
    pub matches: Vec<Match>,
}

/// All flagged lockfiles of one repository. Only produced when at least
/// one lockfile had at least one match.
#[derive(Debug, Clone, Serialize)]
pub struct RepoReport {
    pub repo: String,
    pub lockfiles: Vec<LockfileMatches>,
}

pub trait OutputFormatter {
    fn write_report(
        &self,
        reports: &[RepoReport],
        writer: &mut dyn std::io::Write,
    ) -> std::io::Result<()>;
}

pub struct TextOutput;

impl OutputFormatter for TextOutput {
    fn write_report(
        &self,
        reports: &[RepoReport],
        writer: &mut dyn std::io::Write,
    ) -> std::io::Result<()> {
        writeln!(writer, "=== Scan Result ===")?;

        if reports.is_empty() {
            writeln!(writer, "No repositories found using the target packages.")?;
            return Ok(());
        }

        for report in reports {
            writeln!(writer)?;
            writeln!(writer, "{}", report.repo)?;
            for lockfile in &report.lockfiles {
                writeln!(writer, "  {}", lockfile.path)?;
                for found in &lockfile.matches {
                    writeln!(writer, "    - {}@{}", found.package, found.version)?;
                }
            }
        }
        Ok(())
    }
}

pub struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn write_report(
        &self,
        reports: &[RepoReport],
        writer: &mut dyn std::io::Write,
    ) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, reports)?;
        writeln!(writer)?;
        Ok(())
    }
}

pub fn formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput)
    } else {
        Box::new(TextOutput)
    }
}
