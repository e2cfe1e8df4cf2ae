use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use clap::Parser;
use rlt_worker::{
    ExecutionContext, TargetAdapter, TxOutcome, TxStats, WorkOutput, Workload, WorkloadRegistry,
    cli::WorkerCli,
};
use serde_json::Value;
use tokio::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// A target that answers after a configurable delay.
struct EchoTarget {
    delay: Duration,
}

impl EchoTarget {
    fn connect(config: &Value) -> Result<Self> {
        let delay_ms = match config.get("delayMs") {
            None => 5,
            Some(v) => match v.as_u64() {
                Some(ms) => ms,
                None => bail!("targetConfig.delayMs must be a non-negative integer"),
            },
        };
        Ok(Self { delay: Duration::from_millis(delay_ms) })
    }
}

#[async_trait]
impl TargetAdapter for EchoTarget {
    type Context = Duration;
    type Result = TxOutcome;
    type Snapshot = TxStats;

    async fn get_execution_context(&self, label: &str, _: &Value) -> Result<Option<Duration>> {
        tracing::info!(label, delay = ?self.delay, "connecting echo target");
        Ok(Some(self.delay))
    }

    fn compute_snapshot(&self, batch: &[TxOutcome], detailed: bool) -> TxStats {
        TxStats::from_batch(batch, detailed)
    }

    fn merge_snapshots(&self, snapshots: &[TxStats]) -> TxStats {
        snapshots.iter().fold(TxStats::default(), |acc, s| acc.merge(s))
    }

    fn null_snapshot(&self) -> TxStats {
        TxStats::default()
    }

    fn failure_result(&self, _: &anyhow::Error) -> TxOutcome {
        TxOutcome::failed(-1, Duration::ZERO)
    }
}

/// Sends one echo per work unit; every `failEvery`-th one fails.
#[derive(Default)]
struct Echo {
    delay: Duration,
    fail_every: Option<u64>,
    seq: AtomicU64,
}

#[async_trait]
impl Workload<EchoTarget> for Echo {
    async fn init(&mut self, context: Arc<ExecutionContext<Duration>>, args: &Value) -> Result<()> {
        self.delay = context.inner().copied().unwrap_or_default();
        self.fail_every = args.get("failEvery").and_then(Value::as_u64).filter(|&n| n > 0);
        Ok(())
    }

    async fn run(&self) -> Result<WorkOutput<TxOutcome>> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let t = Instant::now();
        tokio::time::sleep(self.delay).await;
        let latency = t.elapsed();

        let outcome = match self.fail_every {
            Some(n) if seq % n == 0 => TxOutcome::failed(500, latency),
            _ => TxOutcome::committed(latency),
        };
        tracing::debug!(seq, status = %outcome.status);
        Ok(WorkOutput::One(outcome))
    }

    fn label(&self) -> Option<&str> {
        Some("echo")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the event stream
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut workloads = WorkloadRegistry::new();
    workloads.register("echo", Echo::default);
    rlt_worker::cli::run(WorkerCli::parse(), workloads, EchoTarget::connect).await
}
