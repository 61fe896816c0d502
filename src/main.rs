//! stat-harvest - Batch extraction of simulator statistics
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use stat_harvest::config::{CliArgs, HarvestConfig};
use stat_harvest::dispatch::{discover_files, Dispatcher, VariablePlan};
use stat_harvest::output::ResultTable;
use stat_harvest::progress::{print_header, print_summary, ProgressReporter, RunSummary};
use stat_harvest::worker::WorkerPool;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose)?;

    let config = HarvestConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.stats_path,
            &config.pattern,
            config.variables.len(),
            config.pool.pool_size,
            &config.output_path,
        );
    }

    let plan = VariablePlan::new(config.variables.clone()).context("Invalid variable configuration")?;

    let files = discover_files(&config.stats_path, &config.pattern)
        .context("Failed to discover stats files")?;
    let total = files.len() as u64;

    let progress = config.show_progress.then(|| ProgressReporter::new(total));
    if let Some(ref p) = progress {
        p.set_status(&format!("Starting {} workers...", config.pool.pool_size));
    }

    let pool = match WorkerPool::new(config.pool.clone()) {
        Ok(pool) => pool,
        Err(e) => {
            if let Some(ref p) = progress {
                p.finish_and_clear();
            }
            return Err(e).context("Failed to start worker pool");
        }
    };

    let dispatcher = Dispatcher::new(&pool, &plan, config.worker_count)
        .request_timeout(config.pool.request_timeout);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = dispatcher.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing in-flight files...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let done = AtomicBool::new(false);
    let batch = thread::scope(|s| {
        if let Some(reporter) = &progress {
            let counters = dispatcher.counters();
            let done = &done;
            let spawned = thread::Builder::new()
                .name("progress".into())
                .spawn_scoped(s, move || {
                    let start = Instant::now();
                    while !done.load(Ordering::Relaxed) {
                        reporter.update(&counters.snapshot(start.elapsed()));
                        thread::sleep(Duration::from_millis(100));
                    }
                });
            if let Err(e) = spawned {
                warn!(error = %e, "Progress display unavailable");
            }
        }

        let batch = dispatcher.run(files);
        done.store(true, Ordering::Relaxed);
        batch
    });

    let batch = match batch {
        Ok(batch) => batch,
        Err(e) => {
            if let Some(ref p) = progress {
                p.finish("Harvest failed");
            }
            return Err(e).context("Harvest failed");
        }
    };

    if let Some(ref p) = progress {
        if batch.completed {
            p.finish("Harvest completed");
        } else {
            p.finish("Harvest interrupted");
        }
    }

    for failure in &batch.failures {
        warn!(file = %failure.path.display(), error = %failure.error, "File produced no row");
    }

    let completion = batch.check_completed();
    let parsed = batch.results.len() as u64;
    let failed = batch.failures.len() as u64;
    let table = ResultTable::build(&plan.names(), batch.results).context("Failed to reduce results")?;

    if table.is_empty() {
        warn!("No results to write");
    } else {
        table
            .write_csv(&config.output_path)
            .with_context(|| format!("Failed to write {}", config.output_path.display()))?;
        info!(
            path = %config.output_path.display(),
            rows = table.rows().len(),
            columns = table.header().len(),
            "Results written"
        );
    }

    let pool_stats = pool.stats();
    pool.shutdown();

    if config.show_progress {
        print_summary(
            &RunSummary {
                files: parsed + failed,
                failed,
                skipped: batch.skipped as u64,
                rows: table.rows().len() as u64,
                bytes: batch.bytes,
                duration: batch.duration,
                output: &config.output_path,
                completed: batch.completed,
            },
            &pool_stats,
        );
    }

    if failed > 0 {
        info!(failed = failed, "Harvest completed with failed files");
    }

    if !batch.completed {
        info!(skipped = batch.skipped, "Harvest was interrupted before completion");
    }
    completion?;

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("stat_harvest=debug,warn")
    } else {
        EnvFilter::new("stat_harvest=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
