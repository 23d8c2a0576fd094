mod cli;

use std::process;

use clap::Parser;

use cli::Cli;
use lockscan::github::GitHubClient;
use lockscan::targets::TargetSet;
use lockscan::{AuditOptions, Auditor, formatter};

fn init_tracing(args: &Cli) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(args.verbosity.tracing_level_filter())
        .with_writer(std::io::stderr);
    if args.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let targets = match &args.targets {
        Some(path) => TargetSet::from_path(path)?,
        None => TargetSet::builtin(),
    };

    let client = GitHubClient::with_base_url(args.github_token.clone(), args.api_base.as_str());
    let auditor = Auditor::new(
        client,
        targets,
        AuditOptions {
            max_concurrency: args.concurrency,
        },
    );

    let reports = auditor.audit(&args.org, &args.team).await?;
    tracing::debug!(flagged = reports.len(), "audit complete");

    let stdout = std::io::stdout();
    formatter(args.json).write_report(&reports, &mut stdout.lock())?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_tracing(&args);

    if let Err(e) = run(args).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
