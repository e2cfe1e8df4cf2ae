//! Per-run mutable state shared by the driver, its work units and the reporter.
use parking_lot::Mutex;

use crate::{
    adapter::{SubmitNotifier, TargetAdapter},
    buffer::ResultBuffer,
    clock::Clock,
    trim::{Accumulator, TrimConfig},
};

/// State of one test run. Created when submission starts, dropped with the run.
pub struct RunState<A: TargetAdapter> {
    clock: Clock,
    notifier: SubmitNotifier,
    pending: ResultBuffer<A::Result>,
    detailed: bool,
    ledger: Mutex<Ledger<A::Snapshot>>,
}

/// What the reporter has accounted for so far. Locked for a whole tick, which
/// keeps ticks strictly serialized.
pub(crate) struct Ledger<S> {
    pub(crate) last_reported: u64,
    pub(crate) accumulator: Accumulator<S>,
}

impl<A: TargetAdapter> RunState<A> {
    pub(crate) fn new(
        clock: Clock,
        notifier: SubmitNotifier,
        trim: TrimConfig,
        detailed: bool,
    ) -> Self {
        Self {
            clock,
            notifier,
            pending: ResultBuffer::new(),
            detailed,
            ledger: Mutex::new(Ledger { last_reported: 0, accumulator: Accumulator::new(trim) }),
        }
    }

    /// The run clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Number of submissions reported through the notifier.
    pub fn submitted(&self) -> u64 {
        self.notifier.submitted()
    }

    pub(crate) fn notifier(&self) -> &SubmitNotifier {
        &self.notifier
    }

    /// Results completed and not yet drained.
    pub fn pending(&self) -> &ResultBuffer<A::Result> {
        &self.pending
    }

    /// Whether snapshots are computed in detailed mode.
    pub fn detailed(&self) -> bool {
        self.detailed
    }

    pub(crate) fn ledger(&self) -> parking_lot::MutexGuard<'_, Ledger<A::Snapshot>> {
        self.ledger.lock()
    }

    /// Take the final statistics out of the accumulator.
    pub(crate) fn finish(&self, adapter: &A) -> A::Snapshot {
        self.ledger.lock().accumulator.finish(adapter)
    }
}
