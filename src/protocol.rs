//! Command/event messages exchanged with the coordinating process.
//!
//! Messages are JSON objects tagged by `type`. On a byte stream each message
//! occupies one line.
//!
//! | Direction | `type`     | Payload                                   |
//! |-----------|------------|-------------------------------------------|
//! | in        | `test`     | [`TestMessage`]                           |
//! | out       | `progress` | `{ submittedDelta, committed }`           |
//! | out       | `result`   | `{ data }` final statistics               |
//! | out       | `error`    | `{ data }` error message                  |
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    time::Duration,
};

use crate::{driver::RunBound, error::WorkerError, trim::TrimConfig, Result};

/// Largest accepted command line, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Sending half of the event channel.
pub type EventSender<S> = mpsc::UnboundedSender<Event<S>>;

/// A command sent to the worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start a test run.
    Test(Box<TestMessage>),
}

impl Command {
    /// Decode a command from its JSON text.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| WorkerError::Protocol(e.to_string()))?;
        match value.get("type") {
            Some(Value::String(_)) => {}
            Some(_) => return Err(WorkerError::Protocol("command `type` must be a string".into())),
            None => return Err(WorkerError::Protocol("command has no `type`".into())),
        }
        Self::deserialize(value).map_err(|e| WorkerError::Protocol(e.to_string()))
    }
}

/// Payload of a `test` command.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMessage {
    /// Name of the registered workload to run.
    pub workload_module: String,
    /// Configuration used to connect the target adapter.
    #[serde(default)]
    pub target_config: Value,
    /// Label of the test round.
    #[serde(default)]
    pub label: String,
    /// Arguments for creating the execution context.
    #[serde(default)]
    pub client_args: Value,
    /// Arguments for the workload's `init`.
    #[serde(default)]
    pub workload_args: Value,
    /// Number of submissions (fixed-number mode).
    #[serde(default)]
    pub count: Option<u64>,
    /// Length of the run in seconds (duration mode).
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// Rate controller configuration, see [`RateControlConfig`](crate::rate::RateControlConfig).
    #[serde(default)]
    pub rate_control_config: Value,
    /// Leading portion to exclude: seconds in duration mode, results in fixed-number mode.
    #[serde(default)]
    pub trim: Option<f64>,
    /// Compute detailed snapshots; defaults to the worker setting.
    #[serde(default)]
    pub detailed: Option<bool>,
}

impl TestMessage {
    /// Determine the run bound. Exactly one of `count` and `durationSeconds` must be set;
    /// a negative duration is a zero-length run.
    pub fn bound(&self) -> Result<RunBound> {
        match (self.count, self.duration_seconds) {
            (Some(count), None) => Ok(RunBound::Count(count)),
            (None, Some(secs)) if secs.is_nan() || secs.is_infinite() => {
                Err(WorkerError::Protocol(format!("durationSeconds must be finite, got {secs}")))
            }
            (None, Some(secs)) => Duration::try_from_secs_f64(secs.max(0.0))
                .map(RunBound::Duration)
                .map_err(|e| WorkerError::Protocol(format!("durationSeconds {secs}: {e}"))),
            (Some(_), Some(_)) => {
                Err(WorkerError::Protocol("both count and durationSeconds are set".into()))
            }
            (None, None) => {
                Err(WorkerError::Protocol("one of count or durationSeconds is required".into()))
            }
        }
    }

    /// Determine the trim policy for the given bound.
    pub fn trim_config(&self, bound: RunBound) -> Result<TrimConfig> {
        let Some(trim) = self.trim else {
            return Ok(TrimConfig::None);
        };
        if !trim.is_finite() || trim < 0.0 {
            return Err(WorkerError::Protocol(format!(
                "trim must be a non-negative number, got {trim}"
            )));
        }
        match bound {
            _ if trim == 0.0 => Ok(TrimConfig::None),
            RunBound::Count(_) if trim.fract() != 0.0 => Err(WorkerError::Protocol(format!(
                "trim must be a whole number of results, got {trim}"
            ))),
            // saturates: a trim beyond u64::MAX excludes every result
            RunBound::Count(_) => Ok(TrimConfig::ByCount(trim as u64)),
            RunBound::Duration(_) => Duration::try_from_secs_f64(trim)
                .map(TrimConfig::ByElapsedTime)
                .map_err(|e| WorkerError::Protocol(format!("trim {trim}: {e}"))),
        }
    }
}

/// An event emitted by the worker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Event<S> {
    /// Periodic report of one reporter tick.
    Progress {
        /// Submissions since the previous report.
        submitted_delta: u64,
        /// Snapshot over the results completed since the previous report.
        committed: S,
    },
    /// Final statistics of a run.
    Result {
        /// The accepted baseline, or the null snapshot.
        data: S,
    },
    /// The run was aborted or the command was rejected.
    Error {
        /// Error message.
        data: String,
    },
}

impl<S> Event<S> {
    /// Build an error event from an error.
    pub fn error(err: &WorkerError) -> Self {
        Self::Error { data: err.to_string() }
    }
}

/// Read one line from `reader`. Returns `Ok(None)` at end of stream.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let bytes = reader.read_until(b'\n', &mut buffer).await?;
    if bytes == 0 {
        return Ok(None);
    }
    if buffer.len() > MAX_MESSAGE_BYTES {
        return Err(WorkerError::Protocol(format!(
            "message exceeded max size ({MAX_MESSAGE_BYTES} bytes)"
        )));
    }
    if buffer.ends_with(b"\n") {
        buffer.pop();
        if buffer.ends_with(b"\r") {
            buffer.pop();
        }
    }
    String::from_utf8(buffer)
        .map(Some)
        .map_err(|e| WorkerError::Protocol(format!("message is not valid UTF-8: {e}")))
}

/// Write `event` as one JSON line and flush.
pub async fn write_event<W, S>(writer: &mut W, event: &Event<S>) -> Result<()>
where
    W: AsyncWrite + Unpin,
    S: Serialize,
{
    let mut payload = serde_json::to_string(event)?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
