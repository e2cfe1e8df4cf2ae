//! The pending result buffer shared by the submission loop and the reporter.
use parking_lot::Mutex;

/// An append-only collection of completed work results, drained by the reporter.
///
/// Every operation takes the lock for a single step and never across an await,
/// so a drain observes either all or none of a work unit's results.
#[derive(Debug)]
pub struct ResultBuffer<R> {
    inner: Mutex<Inner<R>>,
}

#[derive(Debug)]
struct Inner<R> {
    results: Vec<R>,
    completed: u64,
}

impl<R> ResultBuffer<R> {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { results: Vec::new(), completed: 0 }) }
    }

    /// Appends the results of one completed work unit.
    pub fn push_unit(&self, results: impl IntoIterator<Item = R>) {
        let mut inner = self.inner.lock();
        inner.results.extend(results);
        inner.completed += 1;
    }

    /// Swaps the buffered results for an empty buffer and returns them in arrival order.
    pub fn take(&self) -> Vec<R> {
        std::mem::take(&mut self.inner.lock().results)
    }

    /// Number of results currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().results.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of work units that completed since the run started.
    pub fn completed(&self) -> u64 {
        self.inner.lock().completed
    }

    /// Runs `f` over the buffered results.
    pub fn with<T>(&self, f: impl FnOnce(&[R]) -> T) -> T {
        f(&self.inner.lock().results)
    }
}

impl<R> Default for ResultBuffer<R> {
    fn default() -> Self {
        Self::new()
    }
}
