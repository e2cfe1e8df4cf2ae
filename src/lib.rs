//! A load test worker engine for Rust.
//!
//! This crate is the per-process execution engine of a load-testing worker. It
//! drives a workload of work units against a pluggable target system at a
//! controlled submission rate, collects their outcomes, computes trimmed
//! running statistics and reports progress and final results to a
//! coordinating process over an asynchronous command/event channel.
//!
//! ## Features
//!
//! - **Pluggable**: bring your own [`TargetAdapter`] and [`Workload`]s; the
//!   engine never looks inside results or snapshots.
//! - **Rate controlled**: fixed-rate, linear ramp and fixed-backlog controllers
//!   built in, or implement [`RateController`](rate::RateController).
//! - **Trimmed statistics**: exclude a warm-up window by time or by count.
//! - **Simple protocol**: JSON lines over any byte stream, stdin/stdout by default.
//!
//! ## Example
//!
//! A worker whose single workload commits one transaction per work unit:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use clap::Parser;
//! use rlt_worker::{
//!     cli::WorkerCli, ExecutionContext, TargetAdapter, TxOutcome, TxStats, WorkOutput, Workload,
//!     WorkloadRegistry,
//! };
//! use serde_json::Value;
//! use tokio::time::{Duration, Instant};
//!
//! struct Local;
//!
//! #[async_trait]
//! impl TargetAdapter for Local {
//!     type Context = ();
//!     type Result = TxOutcome;
//!     type Snapshot = TxStats;
//!
//!     async fn get_execution_context(&self, _: &str, _: &Value) -> Result<Option<()>> {
//!         Ok(None)
//!     }
//!
//!     fn compute_snapshot(&self, batch: &[TxOutcome], detailed: bool) -> TxStats {
//!         TxStats::from_batch(batch, detailed)
//!     }
//!
//!     fn merge_snapshots(&self, snapshots: &[TxStats]) -> TxStats {
//!         snapshots.iter().fold(TxStats::default(), |acc, s| acc.merge(s))
//!     }
//!
//!     fn null_snapshot(&self) -> TxStats {
//!         TxStats::default()
//!     }
//!
//!     fn failure_result(&self, _: &anyhow::Error) -> TxOutcome {
//!         TxOutcome::failed(-1, Duration::ZERO)
//!     }
//! }
//!
//! struct Commit;
//!
//! #[async_trait]
//! impl Workload<Local> for Commit {
//!     async fn init(&mut self, _: Arc<ExecutionContext<()>>, _: &Value) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     async fn run(&self) -> Result<WorkOutput<TxOutcome>> {
//!         let t = Instant::now();
//!         // do the work here
//!         Ok(WorkOutput::One(TxOutcome::committed(t.elapsed())))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut workloads = WorkloadRegistry::new();
//!     workloads.register("commit", || Commit);
//!     rlt_worker::cli::run(WorkerCli::parse(), workloads, |_: &Value| Ok(Local)).await
//! }
//! ```
#![deny(missing_docs)]

mod buffer;
mod error;
mod histogram;
mod reporter;
mod state;
mod stats;
mod status;

pub mod adapter;
pub mod cli;
pub mod clock;
pub mod driver;
pub mod phase;
pub mod protocol;
pub mod rate;
pub mod trim;
pub mod worker;
pub mod workload;

pub use crate::{
    adapter::{ExecutionContext, SubmitNotifier, TargetAdapter},
    buffer::ResultBuffer,
    driver::{RunBound, RunConfig, RunSettings, TestDriver},
    error::{Result, WorkerError},
    phase::RunPhase,
    protocol::{Command, Event, TestMessage},
    state::RunState,
    stats::{Counter, TxOutcome, TxStats},
    status::{TxStatus, TxStatusKind},
    trim::TrimConfig,
    worker::{Worker, WorkerOpts},
    workload::{WorkOutput, Workload, WorkloadRegistry},
};
