//! File discovery, per-file parse units and the outer fan-out

pub mod dispatcher;
pub mod unit;

pub use dispatcher::{
    discover_files, BatchResult, DispatchCounters, DispatchProgress, Dispatcher, FileFailure,
};
pub use unit::{FileResult, ParseUnit, VariableMap, VariablePlan, SUMMARY_SUFFIX};

use crate::config::{PoolSettings, VariableConfig};
use crate::error::Result;
use crate::worker::WorkerPool;
use std::path::Path;

/// Parse every file matching `file_pattern` below `stats_path`
///
/// Builds its own worker pool from `settings` and returns one variable map
/// per successfully parsed file, in no particular order. Failed files are
/// logged and left out.
pub fn execute(
    stats_path: &Path,
    file_pattern: &str,
    variables: Vec<VariableConfig>,
    settings: PoolSettings,
) -> Result<Vec<VariableMap>> {
    let plan = VariablePlan::new(variables)?;
    let files = discover_files(stats_path, file_pattern)?;
    let request_timeout = settings.request_timeout;
    let pool = WorkerPool::new(settings)?;

    let batch = Dispatcher::new(&pool, &plan, num_cpus::get() * 2)
        .request_timeout(request_timeout)
        .run(files)?;
    pool.shutdown();

    Ok(batch.results.into_iter().map(|r| r.variables).collect())
}
