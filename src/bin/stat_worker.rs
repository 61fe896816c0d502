//! stat-worker - persistent stats file extractor
//!
//! Speaks the stat-harvest line protocol on stdin/stdout. Started by the
//! worker pool; logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use stat_harvest::extract::serve;
use std::io::{self, BufWriter};
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "stat-worker",
    version,
    about = "Persistent stats file extractor speaking the stat-harvest line protocol"
)]
struct Args {
    /// Debug logging on stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("stat_harvest=debug,stat_worker=debug,warn")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let stdin = io::stdin().lock();
    let stdout = BufWriter::new(io::stdout().lock());
    let stats = serve(stdin, stdout).context("Protocol stream failed")?;
    debug!(requests = stats.requests, errors = stats.errors, "Worker exiting");
    Ok(())
}
