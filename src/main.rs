//! bbx CLI - export a Bitbucket Cloud repository into a migration archive.

use std::process;

use bbx::api::ApiClient;
use bbx::cli::Cli;
use bbx::export::{ExportOptions, Exporter};
use bbx::{Result, archive};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let auth = cli.auth()?;
    let client = ApiClient::new(auth, &cli.workspace, &cli.repo);
    let options = ExportOptions {
        open_only: cli.open_only,
        from_date: cli.since,
        clone_url: cli.clone_url.clone(),
    };

    let summary = Exporter::new(client, &cli.output, options).run()?;

    println!(
        "Exported {}/{}: {} pull requests, {} threads, {} reviews (default branch {:?}{})",
        cli.workspace,
        cli.repo,
        summary.pull_requests,
        summary.threads,
        summary.reviews,
        summary.default_branch,
        if summary.fell_back { ", empty fallback" } else { "" }
    );

    if cli.archive {
        let mut archive_path = cli.output.clone().into_os_string();
        archive_path.push(".tar.gz");
        let archive_path = std::path::PathBuf::from(archive_path);
        archive::pack(&cli.output, &archive_path)?;
        println!("Packed archive at {}", archive_path.display());
    }
    Ok(())
}
