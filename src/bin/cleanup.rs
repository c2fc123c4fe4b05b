//! Delete posts whose author no longer exists.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use quire::config::{Configuration, DEFAULT_CONFIG_PATH};
use quire::reconcile::{ReconcileMode, ReconcileReport, Reconciler};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the configuration file.
    #[arg(long, short, env = "CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// How orphans are found. Defaults to the configured mode, `bulk` unless
    /// changed.
    #[arg(long, short, value_enum)]
    mode: Option<ReconcileMode>,
}

async fn run(args: Args) -> Result<ReconcileReport, Box<dyn std::error::Error + Send + Sync>> {
    let config = Configuration::default().path(args.config).read()?;
    if config.postgres.is_none() {
        return Err("no `postgres` entry in configuration, nothing to clean".into());
    }
    let db = quire::connect(&config).await?;
    let mode = args.mode.unwrap_or(config.maintenance.default_mode);

    Ok(Reconciler::new(db).run(mode).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so stdout only holds the summary.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(ReconcileReport::Scan { deleted, total }) => {
            println!("Cleanup complete. Deleted {deleted} orphaned posts out of {total} total posts.");
            ExitCode::SUCCESS
        },
        Ok(ReconcileReport::Bulk { deleted }) => {
            println!("Bulk cleanup complete. Deleted {deleted} orphaned posts.");
            ExitCode::SUCCESS
        },
        Err(err) => {
            eprintln!("Cleanup failed: {err}");
            ExitCode::FAILURE
        },
    }
}
