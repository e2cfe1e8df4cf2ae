//! Error types of the worker engine.
use thiserror::Error;

/// A specialized [`Result`](std::result::Result) type for worker operations.
pub type Result<T, E = WorkerError> = std::result::Result<T, E>;

/// Errors raised while handling commands or executing a test run.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Workload, execution context or rate controller setup failed.
    /// The run is aborted before any work unit is submitted.
    #[error("initialization failed: {0:#}")]
    Initialization(#[source] anyhow::Error),

    /// The submission loop failed (e.g. the rate controller returned an error).
    #[error("submission failed: {0:#}")]
    Submission(#[source] anyhow::Error),

    /// Workload teardown, rate controller teardown or context release failed.
    #[error("finalization failed: {0:#}")]
    Finalization(#[source] anyhow::Error),

    /// An incoming command was malformed or invalid.
    #[error("invalid command: {0}")]
    Protocol(String),

    /// A `test` command arrived while another run was still active.
    #[error("a test run is already in progress")]
    RunInProgress,

    /// The command referenced a workload module that is not registered.
    #[error("unknown workload module '{0}'")]
    UnknownWorkload(String),

    /// Reading from or writing to the command/event channel failed.
    #[error("channel i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
