//! The periodic reporter: drains completed results, reports progress and
//! feeds the trimmed accumulator.
use std::sync::Arc;

use tokio::{select, task::JoinHandle, time::Duration};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    adapter::TargetAdapter,
    protocol::{Event, EventSender},
    state::RunState,
};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A running periodic reporter task.
///
/// Dropping the reporter cancels the timer; [`Reporter::stop`] additionally
/// waits for an in-flight tick to finish.
pub(crate) struct Reporter {
    guard: DropGuard,
    handle: JoinHandle<()>,
}

impl Reporter {
    /// Start ticking every `interval` on the run clock of `state`.
    pub(crate) fn spawn<A: TargetAdapter>(
        state: Arc<RunState<A>>,
        adapter: Arc<A>,
        events: EventSender<A::Snapshot>,
        interval: Duration,
    ) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();
        let handle = tokio::spawn(async move {
            let mut ticker = state.clock().ticker(interval);
            loop {
                select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tick(&state, adapter.as_ref(), &events);
                    }
                }
            }
        });
        Self { guard, handle }
    }

    /// Cancel the timer and wait until the task has exited.
    pub(crate) async fn stop(self) {
        self.guard.disarm().cancel();
        if let Err(_e) = self.handle.await {
            #[cfg(feature = "tracing")]
            log::warn!("Reporter task failed: {_e}");
        }
    }
}

/// Run one report tick. Returns `true` if a progress event was emitted.
///
/// A tick with no new submissions and no new results is a no-op.
pub(crate) fn tick<A: TargetAdapter>(
    state: &RunState<A>,
    adapter: &A,
    events: &EventSender<A::Snapshot>,
) -> bool {
    let mut ledger = state.ledger();

    let submitted = state.submitted();
    let delta = submitted.saturating_sub(ledger.last_reported);
    ledger.last_reported = submitted;
    let batch = state.pending().take();
    if batch.is_empty() && delta == 0 {
        return false;
    }

    let detailed = state.detailed();
    let snapshot = if batch.is_empty() {
        adapter.null_snapshot()
    } else {
        adapter.compute_snapshot(&batch, detailed)
    };
    // the receiver going away must not stop the run
    let _ = events.send(Event::Progress { submitted_delta: delta, committed: snapshot.clone() });

    let elapsed = state.clock().elapsed();
    let _admission = ledger.accumulator.admit(adapter, elapsed, &batch, snapshot, detailed);
    #[cfg(feature = "tracing")]
    tracing::trace!(delta, results = batch.len(), admission = ?_admission, "report tick");
    true
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        adapter::SubmitNotifier,
        clock::Clock,
        trim::{
            TrimConfig,
            tests::{Sum, SumAdapter},
        },
    };

    fn run_state(trim: TrimConfig) -> (Arc<RunState<SumAdapter>>, SubmitNotifier) {
        let notifier = SubmitNotifier::new();
        let state = RunState::new(Clock::start_now(), notifier.clone(), trim, false);
        (Arc::new(state), notifier)
    }

    fn progress(event: Event<Sum>) -> (u64, Sum) {
        match event {
            Event::Progress { submitted_delta, committed } => (submitted_delta, committed),
            other => panic!("expected progress, got {other:?}"),
        }
    }

    #[test]
    fn idle_tick_emits_nothing() {
        let (state, _) = run_state(TrimConfig::None);
        let adapter = SumAdapter::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(!tick(&state, &adapter, &tx));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn tick_reports_delta_and_drains_batch() {
        let (state, notifier) = run_state(TrimConfig::None);
        let adapter = SumAdapter::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        notifier.notify(3);
        state.pending().push_unit([1, 2]);
        assert!(tick(&state, &adapter, &tx));
        assert_eq!(progress(rx.try_recv().unwrap()), (3, Sum { count: 2, sum: 3 }));
        assert!(state.pending().is_empty());

        notifier.notify(1);
        state.pending().push_unit([4]);
        assert!(tick(&state, &adapter, &tx));
        assert_eq!(progress(rx.try_recv().unwrap()), (1, Sum { count: 1, sum: 4 }));

        assert_eq!(state.finish(&adapter), Sum { count: 3, sum: 7 });
    }

    #[test]
    fn submissions_without_results_report_null_snapshot() {
        let (state, notifier) = run_state(TrimConfig::None);
        let adapter = SumAdapter::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        notifier.notify(2);
        assert!(tick(&state, &adapter, &tx));
        assert_eq!(progress(rx.try_recv().unwrap()), (2, Sum::default()));
    }

    #[test]
    fn progress_carries_untrimmed_snapshot() {
        let (state, notifier) = run_state(TrimConfig::ByCount(1));
        let adapter = SumAdapter::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        notifier.notify(2);
        state.pending().push_unit([5, 6]);
        tick(&state, &adapter, &tx);
        assert_eq!(progress(rx.try_recv().unwrap()), (2, Sum { count: 2, sum: 11 }));
        assert_eq!(state.finish(&adapter), Sum { count: 1, sum: 6 });
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_until_stopped() {
        let (state, notifier) = run_state(TrimConfig::None);
        let adapter = Arc::new(SumAdapter::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = Reporter::spawn(state.clone(), adapter, tx, Duration::from_millis(100));

        notifier.notify(1);
        state.pending().push_unit([1]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(progress(rx.try_recv().unwrap()), (1, Sum { count: 1, sum: 1 }));

        reporter.stop().await;
        notifier.notify(1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }
}
