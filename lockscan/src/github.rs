use anyhow::{Context, Result, bail};
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, instrument};

pub const GITHUB_API_BASE: &str = "https://api.github.com";

const PAGE_SIZE: u32 = 100;

/// A repository as reported by the team-repositories endpoint.
///
/// `default_branch` is carried along because the tree endpoint needs an
/// explicit ref.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoRef {
    pub full_name: String,
    pub default_branch: String,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.entry_type == "blob"
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: String,
}

#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url(token, GITHUB_API_BASE)
    }

    /// Build a client against an alternate API base (GitHub Enterprise,
    /// test servers).
    pub fn with_base_url(token: Option<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::builder()
                .user_agent("lockscan")
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
    }

    /// List every repository the team has access to.
    ///
    /// Pages through the endpoint until the first empty page. Any
    /// non-success response aborts with the response body attached;
    /// there is nothing to scan without the repository list.
    #[instrument(skip(self))]
    pub async fn list_team_repos(&self, org: &str, team_slug: &str) -> Result<Vec<RepoRef>> {
        let url = format!("{}/orgs/{org}/teams/{team_slug}/repos", self.base_url);
        let mut repos = Vec::new();
        let mut page: u32 = 1;

        loop {
            let response = self
                .request(&url)
                .query(&[("page", page.to_string()), ("per_page", PAGE_SIZE.to_string())])
                .send()
                .await
                .with_context(|| format!("request to {url} failed"))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("fetching team repos returned HTTP {status}: {body}");
            }

            let batch: Vec<RepoRef> = response
                .json()
                .await
                .with_context(|| format!("failed to parse team repos page {page}"))?;
            if batch.is_empty() {
                break;
            }
            repos.extend(batch);
            page += 1;
        }

        debug!(count = repos.len(), "team repositories enumerated");
        Ok(repos)
    }

    /// Fetch the full recursive file tree of the repository's default branch.
    #[instrument(skip(self, repo), fields(repo = %repo.full_name))]
    pub async fn list_tree(&self, repo: &RepoRef) -> Result<Vec<TreeEntry>> {
        let url = format!(
            "{}/repos/{}/git/trees/{}",
            self.base_url, repo.full_name, repo.default_branch
        );
        let response = self
            .request(&url)
            .query(&[("recursive", "1")])
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "listing tree of {} returned HTTP {status}: {body}",
                repo.full_name
            );
        }

        let tree: TreeResponse = response
            .json()
            .await
            .with_context(|| format!("failed to parse tree of {}", repo.full_name))?;
        Ok(tree.tree)
    }

    /// Fetch a file's text content, or `None` when the path does not exist.
    ///
    /// A 404 is an expected outcome (the file was removed between the tree
    /// listing and the fetch), not an error.
    #[instrument(skip(self, repo), fields(repo = %repo.full_name))]
    pub async fn get_file_content(&self, repo: &RepoRef, path: &str) -> Result<Option<String>> {
        let url = format!("{}/repos/{}/contents/{path}", self.base_url, repo.full_name);
        let response = self
            .request(&url)
            .query(&[("ref", repo.default_branch.as_str())])
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "fetching {path} from {} returned HTTP {status}: {body}",
                repo.full_name
            );
        }

        let envelope: ContentsResponse = response
            .json()
            .await
            .with_context(|| format!("failed to parse contents envelope for {path}"))?;
        decode_content(&envelope.content).map(Some)
    }
}

/// Decode the base64 payload of a contents envelope.
///
/// GitHub wraps the encoded data across lines; the engine rejects
/// embedded newlines, so whitespace is stripped first.
fn decode_content(content: &str) -> Result<String> {
    let compact: String = content.split_whitespace().collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .context("contents payload is not valid base64")?;
    String::from_utf8(bytes).context("decoded contents are not valid UTF-8")
}
