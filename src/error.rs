//! Error types for stat-harvest
//!
//! This module defines an error hierarchy that covers:
//! - Variable configuration errors
//! - Statistic aggregation errors (validation, balancing, reduction)
//! - Worker process and worker pool errors
//! - Worker output demultiplexing errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include the variable, worker or file involved
//! - Keep per-file failures distinguishable from batch-fatal ones

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the stat-harvest library
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Statistic aggregation errors
    #[error("Statistic error: {0}")]
    Stat(#[from] StatError),

    /// Single worker process errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Worker pool errors
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Worker output errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Result table errors
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

impl HarvestError {
    /// Whether this error only fails the file being processed
    ///
    /// Worker and pool trouble (timeouts, crashes, exhausted retries) fails a
    /// single file. Everything else signals a broken configuration or a
    /// violated data contract and aborts the batch.
    pub fn is_per_file(&self) -> bool {
        match self {
            HarvestError::Worker(_) => true,
            HarvestError::Pool(e) => !matches!(e, PoolError::NoWorkers { .. } | PoolError::Shutdown),
            HarvestError::Parse(ParseError::FileNotFound { .. }) => true,
            _ => false,
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Variable without a type
    #[error("Variable '{name}' is missing the 'type' field")]
    MissingType { name: String },

    /// Type string not recognized
    #[error("Variable '{name}' has unknown type '{kind}' (expected scalar, vector, distribution, histogram or configuration)")]
    UnknownType { name: String, kind: String },

    /// Variable without a name
    #[error("Variable configuration is missing 'name'")]
    MissingName,

    /// Same name configured twice
    #[error("Duplicate variable definition: '{name}'")]
    DuplicateVariable { name: String },

    /// Vector without entries
    #[error("Vector variable '{name}' requires 'entries' or 'vectorEntries'")]
    MissingEntries { name: String },

    /// Invalid numeric parameter
    #[error("Variable '{name}' has invalid parameter '{param}': {reason}")]
    InvalidParameter {
        name: String,
        param: String,
        reason: String,
    },

    /// Invalid pool size
    #[error("Invalid pool size {size}: must be between 1 and {max}")]
    InvalidPoolSize { size: usize, max: usize },

    /// Invalid outer worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Zero timeout
    #[error("Invalid timeout '{name}': must be greater than zero")]
    InvalidTimeout { name: String },

    /// Invalid file pattern
    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Stats path problems
    #[error("Invalid stats path '{path}': {reason}")]
    InvalidStatsPath { path: PathBuf, reason: String },

    /// Discovery matched nothing
    #[error("No files matching '{pattern}' under '{path}'")]
    NoStatsFiles { path: PathBuf, pattern: String },

    /// Output path problems
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },

    /// Variable or scanner file could not be loaded
    #[error("Cannot load '{path}': {reason}")]
    InvalidConfigFile { path: PathBuf, reason: String },

    /// No variables requested
    #[error("No variables configured")]
    NoVariables,
}

/// Statistic aggregation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatError {
    /// Operation called in the wrong lifecycle state
    #[error("{kind}: cannot {action} while {state}")]
    InvalidState {
        kind: &'static str,
        action: &'static str,
        state: &'static str,
    },

    /// Value cannot be read as a number
    #[error("{kind}: value non-convertible to int or float (key: {key}, value: '{value}')")]
    NotNumeric {
        kind: &'static str,
        key: String,
        value: String,
    },

    /// More readings than `repeat`
    #[error("{kind}: slot '{slot}' has more values ({found}) than expected ({repeat})")]
    TooManyValues {
        kind: &'static str,
        slot: String,
        found: usize,
        repeat: usize,
    },

    /// Distribution assignment without underflow/overflow buckets
    #[error("DISTRIBUTION: content must contain 'underflows' and 'overflows' (found keys: {found:?})")]
    MissingOverflowBuckets { found: Vec<String> },

    /// Distribution assignment without the configured boundary buckets
    #[error("DISTRIBUTION: minimum {minimum} or maximum {maximum} not in keys (found keys: {found:?})")]
    MissingBoundaryBuckets {
        minimum: i64,
        maximum: i64,
        found: Vec<String>,
    },

    /// Distribution bucket outside the configured range
    #[error("DISTRIBUTION: bucket '{bucket}' out of range [{minimum}, {maximum}]")]
    BucketOutOfRange {
        bucket: String,
        minimum: i64,
        maximum: i64,
    },

    /// Single value given to an entry type or entries given to a single-value type
    #[error("{kind}: {reason}")]
    WrongShape { kind: &'static str, reason: String },
}

/// Single worker process errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Process could not be spawned
    #[error("Failed to spawn worker {id} ('{program}'): {reason}")]
    SpawnFailed {
        id: usize,
        program: String,
        reason: String,
    },

    /// Process did not announce readiness
    #[error("Worker {id} did not send READY within {timeout:?} (got: '{got}')")]
    NotReady {
        id: usize,
        timeout: Duration,
        got: String,
    },

    /// Request exceeded its budget
    #[error("Worker {id} timed out after {timeout:?}")]
    Timeout { id: usize, timeout: Duration },

    /// Worker was marked unhealthy and awaits restart
    #[error("Worker {id} is not healthy")]
    Unhealthy { id: usize },

    /// Pipe read/write failed
    #[error("Worker {id} I/O failure: {reason}")]
    Io { id: usize, reason: String },

    /// Process closed its stdout
    #[error("Worker {id} exited unexpectedly")]
    Exited { id: usize },
}

impl WorkerError {
    /// Check if this error is a request timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkerError::Timeout { .. })
    }

    /// Worker id the error refers to
    pub fn worker_id(&self) -> usize {
        match self {
            WorkerError::SpawnFailed { id, .. }
            | WorkerError::NotReady { id, .. }
            | WorkerError::Timeout { id, .. }
            | WorkerError::Unhealthy { id }
            | WorkerError::Io { id, .. }
            | WorkerError::Exited { id } => *id,
        }
    }
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    /// Not a single worker could be started
    #[error("No workers could be started ({requested} requested): {reason}")]
    NoWorkers { requested: usize, reason: String },

    /// Nobody returned a worker in time
    #[error("No worker available within {timeout:?}")]
    CheckoutTimeout { timeout: Duration },

    /// Every attempt failed for this file
    #[error("All {attempts} worker attempts failed for '{file}'")]
    AllWorkersFailed { file: PathBuf, attempts: usize },

    /// Pool already shut down
    #[error("Worker pool has been shut down")]
    Shutdown,
}

/// Worker output demultiplexing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Stats file does not exist
    #[error("Stats file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Data line without three '/'-separated fields
    #[error("Malformed worker line: '{line}'")]
    MalformedLine { line: String },

    /// Unknown type tag in a data line
    #[error("Unknown variable type '{kind}' in line '{line}'")]
    UnknownType { kind: String, line: String },

    /// Observed type not reconcilable with the declared one
    #[error("Variable type mismatch - expected: {expected} found: {found} id: {id}")]
    TypeMismatch {
        id: String,
        expected: String,
        found: String,
    },
}

/// Result table errors
#[derive(Error, Debug)]
pub enum OutputError {
    /// CSV encoder failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for HarvestError
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for StatError
pub type StatResult<T> = std::result::Result<T, StatError>;

/// Result type alias for WorkerError
pub type WorkerResult<T> = std::result::Result<T, WorkerError>;

/// Result type alias for PoolError
pub type PoolResult<T> = std::result::Result<T, PoolError>;
