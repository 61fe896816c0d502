//! Progress reporting for a harvest run
//!
//! Provides a progress bar over the discovered stats files and the header and
//! summary printed around a run.

use crate::dispatch::DispatchProgress;
use crate::worker::PoolStats;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Progress bar over the files of a batch
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a reporter for `total` files
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress template")
                .progress_chars("=>-")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &DispatchProgress) {
        self.bar.set_position(progress.files_finished());

        let mut msg = format!(
            "{} | {:.1} files/s",
            format_size(progress.bytes, BINARY),
            progress.files_per_second()
        );
        if progress.files_failed > 0 {
            msg.push_str(&format!(" | {} failed", format_number(progress.files_failed)));
        }
        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Totals shown in the run summary
#[derive(Debug, Clone)]
pub struct RunSummary<'a> {
    pub files: u64,
    pub failed: u64,
    pub skipped: u64,
    pub rows: u64,
    pub bytes: u64,
    pub duration: Duration,
    pub output: &'a Path,
    pub completed: bool,
}

/// Print a summary of the run
pub fn print_summary(summary: &RunSummary<'_>, pool: &PoolStats) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.files as f64 / duration_secs
    } else {
        0.0
    };

    let title = if summary.completed {
        style("Harvest Complete").green().bold()
    } else {
        style("Harvest Interrupted").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Files:").bold(), format_number(summary.files));
    println!("  {} {}", style("Rows:").bold(), format_number(summary.rows));
    println!(
        "  {} {}",
        style("Stats Scanned:").bold(),
        format_size(summary.bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.1} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.failed > 0 {
        println!(
            "  {} {}",
            style("Failed:").yellow().bold(),
            format_number(summary.failed)
        );
    }
    if summary.skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped:").yellow().bold(),
            format_number(summary.skipped)
        );
    }
    println!(
        "  {} {}/{} healthy, {} requests, {} errors, {} restarts",
        style("Workers:").bold(),
        pool.healthy_workers,
        pool.pool_size,
        format_number(pool.total_requests),
        format_number(pool.total_errors),
        format_number(pool.total_restarts),
    );
    println!("  {} {}", style("Output:").bold(), summary.output.display());
    println!();
}

/// Print a header at the start of the run
pub fn print_header(stats_path: &Path, pattern: &str, variables: usize, pool_size: usize, output: &Path) {
    println!();
    println!(
        "{} {}",
        style("stat-harvest").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {} ({})",
        style("Source:").bold(),
        stats_path.display(),
        pattern
    );
    println!("  {} {}", style("Variables:").bold(), variables);
    println!("  {} {}", style("Pool Size:").bold(), pool_size);
    println!("  {} {}", style("Output:").bold(), output.display());
    println!();
}
