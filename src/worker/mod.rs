//! Persistent external worker processes
//!
//! Starting an extractor process per stats file dominates the run time for
//! large batches, so workers are started once and fed requests over a line
//! protocol on stdin/stdout.

pub mod pool;
pub mod process;
pub mod protocol;

pub use pool::{PoolStats, WorkerPool};
pub use process::{WorkerProcess, WorkerState, WorkerStats};
