//! This module provides a CLI interface for running a worker process.
//!
//! Usually you can embed [`WorkerCli`] into your own CLI struct.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use rlt_worker::cli::WorkerCli;
//!
//! #[derive(Parser, Clone)]
//! pub struct Opts {
//!     /// Embed WorkerCli into this Opts.
//!     #[command(flatten)]
//!     pub worker_opts: WorkerCli,
//! }
//! ```
//!
//! The worker reads `test` commands from stdin and writes events to stdout,
//! one JSON object per line:
//!
//! ```shell
//! $ echo '{"type":"test","workloadModule":"echo","count":5}' | myworker -i 200ms
//! {"type":"progress","submittedDelta":5,"committed":{...}}
//! {"type":"result","data":{...}}
//! ```
//!
//! ```shell
//! $ myworker --help
//! Usage: myworker [OPTIONS]
//!
//! Options:
//!   -i, --report-interval <REPORT_INTERVAL>
//!           Interval between progress reports
//!
//!           Examples: -i 1s, -i 500ms
//!
//!           [default: 1s]
//!
//!   -D, --detailed
//!           Compute detailed statistics by default
//!
//!           A `test` command can override this with its `detailed` field.
//!
//!   -h, --help
//!           Print help (see a summary with '-h')
//! ```
use serde_json::Value;
use tokio::io::{stdin, stdout, BufReader};

use clap::{
    builder::{
        styling::{AnsiColor, Effects},
        Styles,
    },
    Parser,
};

use crate::{
    adapter::TargetAdapter,
    worker::{Worker, WorkerOpts},
    workload::WorkloadRegistry,
};

#[derive(Parser, Clone, Debug)]
#[clap(
    styles(Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
    )
)]
#[allow(missing_docs)]
pub struct WorkerCli {
    /// Interval between progress reports
    ///
    /// Examples: -i 1s, -i 500ms
    #[clap(long, short = 'i', default_value = "1s")]
    pub report_interval: humantime::Duration,

    /// Compute detailed statistics by default
    ///
    /// A `test` command can override this with its `detailed` field.
    #[clap(long, short = 'D')]
    pub detailed: bool,
}

impl WorkerCli {
    /// Build the worker options.
    pub fn worker_opts(&self) -> WorkerOpts {
        WorkerOpts { report_interval: self.report_interval.into(), detailed_stats: self.detailed }
    }
}

/// Run a worker over stdin/stdout with the given CLI options, workloads and
/// adapter constructor. Returns when stdin is closed and the last run finished.
pub async fn run<A, F>(
    cli: WorkerCli,
    workloads: WorkloadRegistry<A>,
    connect: F,
) -> anyhow::Result<()>
where
    A: TargetAdapter,
    F: Fn(&Value) -> anyhow::Result<A> + Send + Sync + 'static,
{
    let worker = Worker::new(connect, workloads, cli.worker_opts());
    worker.serve(BufReader::new(stdin()), stdout()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[test]
    fn parses_worker_options() {
        let cli = WorkerCli::parse_from(["worker", "-i", "250ms", "--detailed"]);
        let opts = cli.worker_opts();
        assert_eq!(opts.report_interval, Duration::from_millis(250));
        assert!(opts.detailed_stats);

        let opts = WorkerCli::parse_from(["worker"]).worker_opts();
        assert_eq!(opts, WorkerOpts::default());
    }
}
