pub mod github;
pub mod lockfile;
pub mod report;
pub mod targets;

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use github::{GitHubClient, RepoRef};
use lockfile::{Lockfile, LockfileFormat};
use report::{LockfileMatches, RepoReport};
use targets::TargetSet;

pub use report::{Match, OutputFormatter, formatter};
pub use targets::TargetPackage;

#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Repositories scanned at once. 1 reproduces strictly sequential
    /// scanning; raising it is purely a performance knob.
    pub max_concurrency: usize,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self { max_concurrency: 1 }
    }
}

pub struct Auditor {
    client: GitHubClient,
    targets: Arc<TargetSet>,
    options: AuditOptions,
}

impl Auditor {
    pub fn new(client: GitHubClient, targets: TargetSet, options: AuditOptions) -> Self {
        Self {
            client,
            targets: Arc::new(targets),
            options,
        }
    }

    /// Audit every repository the team has access to.
    ///
    /// Failure to enumerate repositories aborts the run. Everything below
    /// that — tree listing, lockfile fetch, parsing — is logged and skipped
    /// per unit of work.
    pub async fn audit(&self, org: &str, team_slug: &str) -> anyhow::Result<Vec<RepoReport>> {
        info!("fetching team repositories");
        let repos = self.client.list_team_repos(org, team_slug).await?;
        info!(count = repos.len(), "scanning repositories");

        let sem = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let futures: Vec<_> = repos
            .into_iter()
            .map(|repo| {
                let client = self.client.clone();
                let targets = Arc::clone(&self.targets);
                let sem = Arc::clone(&sem);
                async move {
                    let _permit = sem.acquire().await.expect("semaphore closed");
                    Self::scan_repo(repo, client, targets).await
                }
            })
            .collect();

        // join_all preserves input order, so the report follows enumeration
        // order at any concurrency level.
        Ok(join_all(futures).await.into_iter().flatten().collect())
    }

    /// Scan one repository. Returns `None` when nothing matched or the
    /// repository had to be skipped.
    async fn scan_repo(
        repo: RepoRef,
        client: GitHubClient,
        targets: Arc<TargetSet>,
    ) -> Option<RepoReport> {
        info!(repo = %repo.full_name, "scanning");

        let tree = match client.list_tree(&repo).await {
            Ok(tree) => tree,
            Err(e) => {
                warn!(repo = %repo.full_name, error = %e, "failed to list repository tree");
                return None;
            }
        };

        let mut lockfiles = Vec::new();
        for entry in tree {
            if !entry.is_blob() {
                continue;
            }
            let Some(format) = LockfileFormat::from_path(&entry.path) else {
                continue;
            };
            if let Some(found) =
                Self::scan_lockfile(&repo, &entry.path, format, &client, &targets).await
            {
                lockfiles.push(found);
            }
        }

        if lockfiles.is_empty() {
            None
        } else {
            Some(RepoReport {
                repo: repo.full_name,
                lockfiles,
            })
        }
    }

    /// Fetch, parse, and scan one lockfile. Returns `None` when the file
    /// is absent, unreadable, or produced no matches.
    async fn scan_lockfile(
        repo: &RepoRef,
        path: &str,
        format: LockfileFormat,
        client: &GitHubClient,
        targets: &TargetSet,
    ) -> Option<LockfileMatches> {
        let text = match client.get_file_content(repo, path).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(repo = %repo.full_name, path, "lockfile vanished between listing and fetch");
                return None;
            }
            Err(e) => {
                warn!(repo = %repo.full_name, path, error = %e, "failed to fetch lockfile");
                return None;
            }
        };

        let lockfile = match Lockfile::parse(format, &text) {
            Ok(lockfile) => lockfile,
            Err(e) => {
                warn!(repo = %repo.full_name, path, error = %e, "failed to parse lockfile");
                return None;
            }
        };

        let matches = lockfile.matches(targets);
        if matches.is_empty() {
            None
        } else {
            Some(LockfileMatches {
                path: path.to_string(),
                matches,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_options_default_is_sequential() {
        assert_eq!(AuditOptions::default().max_concurrency, 1);
    }

    #[test]
    fn auditor_holds_passed_in_targets() {
        let auditor = Auditor::new(
            GitHubClient::new(None),
            TargetSet::builtin(),
            AuditOptions::default(),
        );
        assert_eq!(auditor.targets.len(), 5);
    }
}
