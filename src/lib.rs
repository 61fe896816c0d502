//! stat-harvest - Batch extraction of simulator statistics
//!
//! Extracts named statistics from large simulator stats files and reduces
//! them to one value per statistic per file, ready for a CSV table.
//!
//! # Features
//!
//! - **Persistent Workers**: A bounded pool of long-lived extractor processes
//!   amortizes process startup over thousands of files. Workers are health
//!   checked and restarted in place.
//!
//! - **Typed Aggregation**: Scalars, vectors, distributions, histograms and
//!   configuration strings accumulate repeated readings, are padded to the
//!   expected repeat count and reduced to a canonical value.
//!
//! - **Histogram Rebinning**: Histograms with different bucket layouts across
//!   files are redistributed proportionally onto a fixed layout.
//!
//! - **Per-File Failures**: A worker crash or timeout fails (or retries) a
//!   single file, never the batch.
//!
//! # Architecture
//!
//! ```text
//!   stats tree ──▶ discover_files
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Dispatcher threads                      │
//! │  ┌──────────┐  ┌──────────┐           ┌──────────┐       │
//! │  │ParseUnit │  │ParseUnit │   ...     │ParseUnit │       │
//! │  └────┬─────┘  └────┬─────┘           └────┬─────┘       │
//! │       └─────────────┼──────────────────────┘             │
//! │                     ▼  checkout (blocking, bounded)      │
//! │        ┌───────────────────────────────┐                 │
//! │        │          WorkerPool           │◀── health       │
//! │        │  stat-worker × pool_size      │    monitor      │
//! │        └───────────────────────────────┘                 │
//! └──────────────────────────────────────────────────────────┘
//!                       │  typed data lines
//!                       ▼
//!        StatVariable per (file, variable) ── balance ── reduce
//!                       │
//!                       ▼
//!                 ResultTable ──▶ results.csv
//! ```
//!
//! # Example
//!
//! ```bash
//! # Extract the variables of vars.json from every stats.txt below runs/
//! stat-harvest runs/ --variables vars.json -o results.csv
//!
//! # Bigger pool, custom file names
//! stat-harvest runs/ --variables vars.json --pattern 'stats*.txt' --pool-size 16
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod output;
pub mod progress;
pub mod stats;
pub mod worker;

pub use config::{CliArgs, HarvestConfig, PoolSettings, VariableConfig, WorkerCommand};
pub use dispatch::{execute, BatchResult, Dispatcher, FileResult, ParseUnit, VariablePlan};
pub use error::{HarvestError, Result};
pub use output::ResultTable;
pub use stats::{ReducedValue, StatKind, StatVariable};
pub use worker::{PoolStats, WorkerPool};
