//! Workload modules: what a single work unit does.
use std::{collections::HashMap, fmt, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::{
    adapter::{ExecutionContext, TargetAdapter},
    error::WorkerError,
};

/// A workload issues requests against the target through an adapter's context.
///
/// `init` is called once before the first submission, `run` once per work unit
/// (many may be in flight at the same time), and `end` once after every work
/// unit completed.
#[async_trait]
pub trait Workload<A: TargetAdapter>: Send + Sync {
    /// Prepare the workload for a run.
    async fn init(
        &mut self,
        context: Arc<ExecutionContext<A::Context>>,
        args: &Value,
    ) -> Result<()>;

    /// Execute one work unit.
    ///
    /// An `Err` does not stop the run; it is turned into a result by
    /// [`TargetAdapter::failure_result`].
    async fn run(&self) -> Result<WorkOutput<A::Result>>;

    /// Tear the workload down after the run.
    async fn end(&self) -> Result<()> {
        Ok(())
    }

    /// An optional human readable name of the workload.
    fn label(&self) -> Option<&str> {
        None
    }
}

/// The results produced by one work unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutput<R> {
    /// A single result.
    One(R),
    /// Several results, e.g. one submission carrying a batch of transactions.
    Many(Vec<R>),
}

impl<R> WorkOutput<R> {
    /// Number of results.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(v) => v.len(),
        }
    }

    /// Returns `true` if the work unit produced no result.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> IntoIterator for WorkOutput<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Self::One(r) => vec![r].into_iter(),
            Self::Many(v) => v.into_iter(),
        }
    }
}

impl<R> From<Vec<R>> for WorkOutput<R> {
    fn from(v: Vec<R>) -> Self {
        Self::Many(v)
    }
}

type WorkloadFactory<A> = Box<dyn Fn() -> Box<dyn Workload<A>> + Send + Sync>;

/// Maps workload module names to constructors.
pub struct WorkloadRegistry<A: TargetAdapter> {
    factories: HashMap<String, WorkloadFactory<A>>,
}

impl<A: TargetAdapter> WorkloadRegistry<A> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Register a workload constructor under `module`, replacing any previous one.
    pub fn register<F, W>(&mut self, module: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> W + Send + Sync + 'static,
        W: Workload<A> + 'static,
    {
        self.factories.insert(module.into(), Box::new(move || Box::new(factory())));
        self
    }

    /// Build a fresh workload instance for `module`.
    pub fn create(&self, module: &str) -> crate::Result<Box<dyn Workload<A>>> {
        self.factories
            .get(module)
            .map(|factory| factory())
            .ok_or_else(|| WorkerError::UnknownWorkload(module.to_string()))
    }

    /// Returns `true` if `module` is registered.
    pub fn contains(&self, module: &str) -> bool {
        self.factories.contains_key(module)
    }
}

impl<A: TargetAdapter> Default for WorkloadRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: TargetAdapter> fmt::Debug for WorkloadRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<_> = self.factories.keys().collect();
        modules.sort();
        f.debug_struct("WorkloadRegistry").field("modules", &modules).finish()
    }
}
