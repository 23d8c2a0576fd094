use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

use lockscan::github::GITHUB_API_BASE;

/// Audit a team's repositories for flagged package versions in their lockfiles
#[derive(Parser)]
#[command(name = "lockscan", version)]
pub struct Cli {
    /// GitHub organization
    #[arg(long, env = "ORG")]
    pub org: String,

    /// Team slug within the organization
    #[arg(long, env = "TEAM_SLUG")]
    pub team: String,

    /// GitHub API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub API base URL (GitHub Enterprise installs)
    #[arg(long, env = "GITHUB_API_URL", default_value = GITHUB_API_BASE)]
    pub api_base: String,

    /// JSON file of target packages; defaults to the built-in set
    #[arg(long)]
    pub targets: Option<PathBuf>,

    /// Maximum repositories scanned at once
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Emit the report (and logs) as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}
