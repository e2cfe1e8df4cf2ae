//! The target-system abstraction consumed by the test driver.
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A connector to the system under test.
///
/// The adapter owns connection lifecycle and statistics: the worker core never
/// looks inside [`Result`](TargetAdapter::Result)s or
/// [`Snapshot`](TargetAdapter::Snapshot)s, it only batches the former and
/// merges the latter through this trait.
#[async_trait]
pub trait TargetAdapter: Send + Sync + 'static {
    /// Adapter-specific client state shared with the workload (connections, keys, ...).
    type Context: Send + Sync + 'static;

    /// Outcome of one request against the target.
    type Result: Send + Sync + 'static;

    /// Aggregate statistics over a batch of results.
    type Snapshot: Serialize + Clone + Send + Sync + 'static;

    /// Create the client state for a run. `Ok(None)` means the adapter needs no
    /// state; the workload then receives a context that only carries the
    /// [`SubmitNotifier`].
    async fn get_execution_context(
        &self,
        label: &str,
        client_args: &Value,
    ) -> Result<Option<Self::Context>>;

    /// Release the client state created by [`get_execution_context`](Self::get_execution_context).
    #[allow(unused_variables)]
    async fn release_execution_context(
        &self,
        context: &ExecutionContext<Self::Context>,
    ) -> Result<()> {
        Ok(())
    }

    /// Compute a snapshot over a batch of results, in arrival order.
    fn compute_snapshot(&self, batch: &[Self::Result], detailed: bool) -> Self::Snapshot;

    /// Combine snapshots given in chronological order into one.
    fn merge_snapshots(&self, snapshots: &[Self::Snapshot]) -> Self::Snapshot;

    /// The snapshot of zero results.
    fn null_snapshot(&self) -> Self::Snapshot;

    /// Represent a failed work unit (an error or a panic) as a result, so it is
    /// accounted like any other outcome.
    fn failure_result(&self, error: &anyhow::Error) -> Self::Result;

    /// Returns `true` if the adapter's transport calls [`SubmitNotifier::notify`]
    /// itself. Otherwise the driver notifies one submission per launched work unit.
    fn reports_submissions(&self) -> bool {
        false
    }
}

/// The capability to report newly submitted (not yet completed) requests.
///
/// This is the only way the submitted-count of a run moves.
#[derive(Debug, Clone, Default)]
pub struct SubmitNotifier {
    submitted: Arc<AtomicU64>,
}

impl SubmitNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Report `count` newly submitted requests.
    pub fn notify(&self, count: u64) {
        self.submitted.fetch_add(count, Ordering::AcqRel);
    }

    /// Number of requests submitted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }
}

/// The execution context handed to a workload at init.
#[derive(Debug)]
pub struct ExecutionContext<C> {
    inner: Option<C>,
    notifier: SubmitNotifier,
}

impl<C> ExecutionContext<C> {
    pub(crate) fn new(inner: Option<C>, notifier: SubmitNotifier) -> Self {
        Self { inner, notifier }
    }

    /// The adapter's client state, if it created one.
    pub fn inner(&self) -> Option<&C> {
        self.inner.as_ref()
    }

    /// The submission notifier of the current run.
    pub fn notifier(&self) -> &SubmitNotifier {
        &self.notifier
    }
}
