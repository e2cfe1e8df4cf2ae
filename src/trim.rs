//! Warm-up trimming and baseline accumulation.
//!
//! Every reporter tick hands its snapshot to an [`Accumulator`]. Until a
//! baseline exists the [`TrimConfig`] decides whether the snapshot is
//! discarded (warm-up) or becomes the baseline; afterwards every snapshot is
//! merged into the baseline, oldest operand first.
use tokio::time::Duration;

use crate::adapter::TargetAdapter;

/// Which leading portion of a run is excluded from the final statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimConfig {
    /// Nothing is trimmed.
    #[default]
    None,
    /// Snapshots taken before this much time elapsed are discarded.
    ByElapsedTime(Duration),
    /// The first this many results, in arrival order, are discarded.
    ByCount(u64),
}

/// What happened to a snapshot handed to [`Accumulator::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The snapshot was trimmed away.
    Discarded,
    /// The snapshot (possibly recomputed over untrimmed results) became the baseline.
    Baseline,
    /// The snapshot was merged into the existing baseline.
    Merged,
}

/// Holds the accepted baseline of a run and applies trimming until one exists.
#[derive(Debug)]
pub struct Accumulator<S> {
    trim: TrimConfig,
    baseline: Option<S>,
}

impl<S> Accumulator<S> {
    /// Create an empty accumulator with the given trim policy.
    pub fn new(trim: TrimConfig) -> Self {
        Self { trim, baseline: None }
    }

    /// The accepted baseline, if any snapshot survived trimming.
    pub fn baseline(&self) -> Option<&S> {
        self.baseline.as_ref()
    }

    /// Feed the snapshot of one tick.
    ///
    /// `batch` are the raw results `snapshot` was computed from and `elapsed`
    /// the run time at which the tick fired.
    pub fn admit<A>(
        &mut self,
        adapter: &A,
        elapsed: Duration,
        batch: &[A::Result],
        snapshot: S,
        detailed: bool,
    ) -> Admission
    where
        A: TargetAdapter<Snapshot = S>,
    {
        let Some(baseline) = self.baseline.take() else {
            return self.admit_first(adapter, elapsed, batch, snapshot, detailed);
        };
        self.baseline = Some(adapter.merge_snapshots(&[baseline, snapshot]));
        Admission::Merged
    }

    fn admit_first<A>(
        &mut self,
        adapter: &A,
        elapsed: Duration,
        batch: &[A::Result],
        snapshot: S,
        detailed: bool,
    ) -> Admission
    where
        A: TargetAdapter<Snapshot = S>,
    {
        let baseline = match &mut self.trim {
            TrimConfig::None => snapshot,
            TrimConfig::ByElapsedTime(threshold) if elapsed < *threshold => {
                return Admission::Discarded;
            }
            TrimConfig::ByElapsedTime(_) => snapshot,
            TrimConfig::ByCount(0) => snapshot,
            TrimConfig::ByCount(remaining) => {
                let len = batch.len() as u64;
                if len <= *remaining {
                    *remaining -= len;
                    return Admission::Discarded;
                }
                // only reached with `remaining < batch.len()`, so it fits in usize
                let skip = *remaining as usize;
                *remaining = 0;
                adapter.compute_snapshot(&batch[skip..], detailed)
            }
        };
        self.baseline = Some(baseline);
        Admission::Baseline
    }

    /// The final statistics: the baseline, or the null snapshot if nothing was accepted.
    pub fn finish<A>(&mut self, adapter: &A) -> S
    where
        A: TargetAdapter<Snapshot = S>,
    {
        self.baseline.take().unwrap_or_else(|| adapter.null_snapshot())
    }
}
