//! Outer fan-out over discovered stats files
//!
//! ```text
//!  discover_files ──▶ job channel ──┬── dispatch-0 ─┐
//!                                   ├── dispatch-1 ─┼──▶ outcome channel ──▶ BatchResult
//!                                   └── dispatch-N ─┘
//!                                         │
//!                                         ▼
//!                                    WorkerPool (pool_size processes)
//! ```
//!
//! The outer threads are usually more numerous than the worker processes;
//! checkout on the pool provides the backpressure.

use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::dispatch::unit::{FileResult, ParseUnit, VariablePlan};
use crate::error::{ConfigError, HarvestError, Result};
use crate::worker::WorkerPool;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Find stats files named like `pattern` at any depth below `root`
///
/// A `root` that is itself a file is returned as the only match. Results
/// are sorted; finding nothing is an error.
pub fn discover_files(root: &Path, pattern: &str) -> std::result::Result<Vec<PathBuf>, ConfigError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let root_str = root.to_str().ok_or_else(|| ConfigError::InvalidStatsPath {
        path: root.to_path_buf(),
        reason: "path is not valid UTF-8".into(),
    })?;
    let full = format!(
        "{}/**/{}",
        glob::Pattern::escape(root_str.trim_end_matches('/')),
        pattern
    );

    let entries = glob::glob(&full).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!(path = %e.path().display(), error = %e.error(), "Skipping unreadable path"),
        }
    }
    if files.is_empty() {
        return Err(ConfigError::NoStatsFiles {
            path: root.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }
    files.sort();
    debug!(root = %root.display(), pattern = pattern, count = files.len(), "Stats files discovered");
    Ok(files)
}

/// Shared dispatch counters
#[derive(Debug, Default)]
pub struct DispatchCounters {
    files_total: AtomicU64,
    files_done: AtomicU64,
    files_failed: AtomicU64,
    bytes: AtomicU64,
}

impl DispatchCounters {
    fn record_file(&self, bytes: u64) {
        self.files_done.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view of the counters
    pub fn snapshot(&self, elapsed: Duration) -> DispatchProgress {
        DispatchProgress {
            files_total: self.files_total.load(Ordering::Relaxed),
            files_done: self.files_done.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct DispatchProgress {
    pub files_total: u64,
    pub files_done: u64,
    pub files_failed: u64,
    /// Bytes of stats files parsed so far
    pub bytes: u64,
    pub elapsed: Duration,
}

impl DispatchProgress {
    /// Files finished, successfully or not
    pub fn files_finished(&self) -> u64 {
        self.files_done + self.files_failed
    }

    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files_finished() as f64 / secs
        } else {
            0.0
        }
    }
}

/// A file that could not be processed
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: HarvestError,
}

/// Outcome of a batch
#[derive(Debug)]
pub struct BatchResult {
    /// One entry per successfully parsed file, in completion order
    pub results: Vec<FileResult>,

    /// Files that failed without aborting the batch
    pub failures: Vec<FileFailure>,

    /// Files never started because of an interrupt
    pub skipped: usize,

    /// Total bytes of parsed stats files
    pub bytes: u64,

    pub duration: Duration,

    /// Whether every file was attempted
    pub completed: bool,
}

impl BatchResult {
    /// `Interrupted` when files were skipped by a shutdown request
    pub fn check_completed(&self) -> Result<()> {
        if self.completed {
            Ok(())
        } else {
            Err(HarvestError::Interrupted)
        }
    }
}

/// Runs one [`ParseUnit`] per file across a set of outer threads
pub struct Dispatcher<'a> {
    pool: &'a WorkerPool,
    plan: &'a VariablePlan,
    worker_count: usize,
    request_timeout: Duration,
    shutdown: Arc<AtomicBool>,
    counters: Arc<DispatchCounters>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(pool: &'a WorkerPool, plan: &'a VariablePlan, worker_count: usize) -> Self {
        Self {
            pool,
            plan,
            worker_count: worker_count.max(1),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            shutdown: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(DispatchCounters::default()),
        }
    }

    /// Per-file request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Counters shared with progress reporting
    pub fn counters(&self) -> Arc<DispatchCounters> {
        Arc::clone(&self.counters)
    }

    /// Process every file
    ///
    /// Per-file failures (worker timeouts, crashes, exhausted retries, missing
    /// files) are collected in the result. Any other error stops handing out
    /// files and is returned once in-flight files have finished.
    pub fn run(&self, files: Vec<PathBuf>) -> Result<BatchResult> {
        let start = Instant::now();
        let total = files.len();
        self.counters
            .files_total
            .store(total as u64, Ordering::Relaxed);

        info!(
            files = total,
            threads = self.worker_count,
            pool_size = self.pool.size(),
            "Starting dispatch"
        );

        let (job_tx, job_rx) = unbounded::<PathBuf>();
        for file in files {
            let _ = job_tx.send(file);
        }
        drop(job_tx);

        let (out_tx, out_rx) = unbounded();
        let abort = AtomicBool::new(false);
        let threads = self.worker_count.min(total).max(1);

        thread::scope(|s| -> Result<()> {
            for id in 0..threads {
                let jobs = job_rx.clone();
                let outcomes = out_tx.clone();
                let abort = &abort;
                thread::Builder::new()
                    .name(format!("dispatch-{}", id))
                    .spawn_scoped(s, move || self.dispatch_loop(id, jobs, outcomes, abort))?;
            }
            Ok(())
        })?;
        drop(out_tx);

        let mut results = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut fatal = None;
        for (path, outcome) in out_rx.iter() {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) if e.is_per_file() => failures.push(FileFailure { path, error: e }),
                Err(e) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        let skipped = job_rx.len();
        let duration = start.elapsed();
        let bytes = results.iter().map(|r| r.bytes).sum();
        let completed = skipped == 0;

        info!(
            parsed = results.len(),
            failed = failures.len(),
            skipped = skipped,
            duration_ms = duration.as_millis() as u64,
            "Dispatch finished"
        );

        Ok(BatchResult {
            results,
            failures,
            skipped,
            bytes,
            duration,
            completed,
        })
    }

    fn dispatch_loop(
        &self,
        id: usize,
        jobs: Receiver<PathBuf>,
        outcomes: Sender<(PathBuf, Result<FileResult>)>,
        abort: &AtomicBool,
    ) {
        loop {
            if self.shutdown.load(Ordering::Relaxed) || abort.load(Ordering::Relaxed) {
                break;
            }
            let Ok(file) = jobs.try_recv() else {
                break;
            };

            debug!(thread = id, file = %file.display(), "Parsing file");
            let outcome = ParseUnit::new(&file, self.plan).run(self.pool, self.request_timeout);
            match &outcome {
                Ok(result) => self.counters.record_file(result.bytes),
                Err(e) if e.is_per_file() => {
                    warn!(file = %file.display(), error = %e, "File failed");
                    self.counters.record_failure();
                }
                Err(e) => {
                    error!(file = %file.display(), error = %e, "Aborting batch");
                    abort.store(true, Ordering::SeqCst);
                }
            }

            if outcomes.send((file, outcome)).is_err() {
                break;
            }
        }
    }
}
