// Error handling module
// Defines the error taxonomy for backends, the start barrier, and benchmark levels

use thiserror::Error;

/// Errors raised by a search backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The worker could not establish its backend session
    #[error("Connection failed: {0}")]
    Connect(String),

    /// A single search call failed
    #[error("Search failed: {0}")]
    Query(String),

    /// The backend answered with a non-success status
    #[error("Backend error: {status} - {message}")]
    Status { status: u16, message: String },
}

/// Errors raised by the rendezvous barrier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    /// `release` was called before every participant signaled ready
    #[error("Barrier released early: {ready} of {expected} workers ready")]
    Premature { ready: usize, expected: usize },

    /// The controller abandoned the level before releasing the barrier
    #[error("Barrier aborted before release")]
    Aborted,

    /// The controller abandoned the level while the worker was running
    #[error("Level stopped before the run completed")]
    Stopped,
}

/// Errors raised by a single worker unit
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Barrier(#[from] BarrierError),

    /// The worker's private runtime could not be built
    #[error("Worker runtime error: {0}")]
    Runtime(String),
}

/// Reasons a concurrency level is reported as failed
#[derive(Error, Debug)]
pub enum LevelError {
    /// A worker returned an error
    #[error("Worker {worker} failed: {source}")]
    Worker {
        worker: usize,
        #[source]
        source: WorkerError,
    },

    /// A worker terminated without handing back a result
    #[error("Worker {worker} crashed before returning a result")]
    WorkerCrashed { worker: usize },

    /// Not every worker signaled ready within the configured bound
    #[error("Timed out after {timeout_secs}s waiting for workers: {ready} of {expected} ready")]
    ReadyTimeout {
        ready: usize,
        expected: usize,
        timeout_secs: u64,
    },

    /// Workers did not finish within duration plus grace
    #[error("Timed out after {timeout_secs}s waiting for {pending} workers to finish")]
    JoinTimeout { pending: usize, timeout_secs: u64 },

    #[error(transparent)]
    Barrier(#[from] BarrierError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Errors raised while reducing worker results
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// No query completed, so mean and percentiles are undefined
    #[error("No latency samples collected")]
    EmptySampleSet,
}

/// Configuration errors; always fatal at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value is out of its accepted range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A line in a `key#value` file could not be parsed
    #[error("Invalid configuration line {line}: {content}")]
    Malformed { line: usize, content: String },

    /// The config file could not be read or deserialized
    #[error("Failed to load config file {path}: {message}")]
    File { path: String, message: String },
}

/// Result type alias for benchmark level operations
pub type Result<T> = std::result::Result<T, LevelError>;
