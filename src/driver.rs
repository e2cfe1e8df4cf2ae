//! The test driver: one rate-controlled run from initialization to final statistics.
use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;
use tokio::{
    sync::watch,
    task::{JoinError, JoinSet},
    time::Duration,
};

use crate::{
    adapter::{ExecutionContext, SubmitNotifier, TargetAdapter},
    clock::Clock,
    error::WorkerError,
    phase::RunPhase,
    protocol::EventSender,
    rate::{PacingContext, RateController},
    reporter::{self, Reporter},
    state::RunState,
    trim::TrimConfig,
    workload::{WorkOutput, Workload},
    Result,
};

/// When the submission loop of a run stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunBound {
    /// Stop once this many submissions were reported.
    Count(u64),
    /// Stop once this much time elapsed since the start of submission.
    Duration(Duration),
}

/// What a rate controller is told about the run at init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Label of the test round.
    pub label: String,
    /// The bound of the submission loop.
    pub bound: RunBound,
}

/// Per-run settings of a [`TestDriver`].
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Label of the test round.
    pub label: String,
    /// Arguments for [`TargetAdapter::get_execution_context`].
    pub client_args: Value,
    /// Arguments for [`Workload::init`].
    pub workload_args: Value,
    /// Leading portion excluded from the final statistics.
    pub trim: TrimConfig,
    /// Compute detailed snapshots.
    pub detailed: bool,
    /// Interval of the periodic reporter.
    pub report_interval: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            label: String::new(),
            client_args: Value::Null,
            workload_args: Value::Null,
            trim: TrimConfig::None,
            detailed: false,
            report_interval: Duration::from_secs(1),
        }
    }
}

/// Drives a single test run.
///
/// Progress events are sent on `events` while the run is submitting or
/// draining; the final statistics are the return value.
pub struct TestDriver<A: TargetAdapter> {
    adapter: Arc<A>,
    events: EventSender<A::Snapshot>,
    settings: RunSettings,
    phase: watch::Sender<RunPhase>,
}

impl<A: TargetAdapter> TestDriver<A> {
    /// Create a driver for one run.
    pub fn new(adapter: Arc<A>, events: EventSender<A::Snapshot>, settings: RunSettings) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self { adapter, events, settings, phase }
    }

    /// Watch the phase of the run.
    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    /// Submit exactly `count` work units.
    pub async fn run_fixed(
        self,
        count: u64,
        workload: Box<dyn Workload<A>>,
        rate: Box<dyn RateController<A::Result>>,
    ) -> Result<A::Snapshot> {
        self.run(RunBound::Count(count), workload, rate).await
    }

    /// Submit work units until `duration` elapsed.
    pub async fn run_duration(
        self,
        duration: Duration,
        workload: Box<dyn Workload<A>>,
        rate: Box<dyn RateController<A::Result>>,
    ) -> Result<A::Snapshot> {
        self.run(RunBound::Duration(duration), workload, rate).await
    }

    /// Run with the given bound.
    pub async fn run(
        self,
        bound: RunBound,
        workload: Box<dyn Workload<A>>,
        mut rate: Box<dyn RateController<A::Result>>,
    ) -> Result<A::Snapshot> {
        self.set_phase(RunPhase::Initializing);
        let notifier = SubmitNotifier::new();
        let initialized = self.initialize(bound, workload, rate.as_mut(), &notifier).await;
        let (context, workload) = match initialized {
            Ok(ready) => ready,
            Err(e) => {
                self.set_phase(RunPhase::Failed);
                return Err(e);
            }
        };

        let clock = Clock::start_now();
        let settings = &self.settings;
        let state = Arc::new(RunState::new(clock, notifier, settings.trim, settings.detailed));

        self.set_phase(RunPhase::Submitting);
        let reporter = Reporter::spawn(
            state.clone(),
            self.adapter.clone(),
            self.events.clone(),
            settings.report_interval,
        );
        let submitted = self.submit(bound, &state, &workload, rate.as_mut()).await;

        self.set_phase(RunPhase::Draining);
        let units = match submitted {
            Ok(units) => units,
            Err((units, e)) => {
                self.drain(units, &state).await;
                reporter.stop().await;
                reporter::tick(&state, self.adapter.as_ref(), &self.events);
                self.set_phase(RunPhase::Failed);
                return Err(WorkerError::Submission(e));
            }
        };
        self.drain(units, &state).await;
        reporter.stop().await;
        reporter::tick(&state, self.adapter.as_ref(), &self.events);

        self.set_phase(RunPhase::Finalizing);
        if let Err(e) = self.finalize(&context, workload.as_ref(), rate.as_mut()).await {
            self.set_phase(RunPhase::Failed);
            return Err(WorkerError::Finalization(e));
        }

        let stats = state.finish(self.adapter.as_ref());
        self.set_phase(RunPhase::Completed);
        #[cfg(feature = "tracing")]
        tracing::debug!(label = %settings.label, submitted = state.submitted(), "run completed");
        Ok(stats)
    }

    async fn initialize(
        &self,
        bound: RunBound,
        mut workload: Box<dyn Workload<A>>,
        rate: &mut dyn RateController<A::Result>,
        notifier: &SubmitNotifier,
    ) -> Result<(Arc<ExecutionContext<A::Context>>, Arc<dyn Workload<A>>)> {
        let settings = &self.settings;
        let inner = self
            .adapter
            .get_execution_context(&settings.label, &settings.client_args)
            .await
            .map_err(WorkerError::Initialization)?;
        let context = Arc::new(ExecutionContext::new(inner, notifier.clone()));

        let init = async {
            workload.init(context.clone(), &settings.workload_args).await?;
            rate.init(&RunConfig { label: settings.label.clone(), bound }).await
        };
        if let Err(e) = init.await {
            if let Err(_release) = self.adapter.release_execution_context(&context).await {
                #[cfg(feature = "tracing")]
                log::warn!("Error releasing execution context after failed init: {_release:?}");
            }
            return Err(WorkerError::Initialization(e));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            label = %settings.label,
            workload = workload.label().unwrap_or("-"),
            ?bound,
            "run initialized"
        );
        Ok((context, Arc::from(workload)))
    }

    /// The submission loop. On a pacing error the already launched work units
    /// are handed back with the error so they can still be drained.
    async fn submit(
        &self,
        bound: RunBound,
        state: &Arc<RunState<A>>,
        workload: &Arc<dyn Workload<A>>,
        rate: &mut dyn RateController<A::Result>,
    ) -> std::result::Result<JoinSet<()>, (JoinSet<()>, anyhow::Error)> {
        let notify = !self.adapter.reports_submissions();
        let mut units = JoinSet::new();
        loop {
            let done = match bound {
                RunBound::Count(count) => state.submitted() >= count,
                RunBound::Duration(duration) => state.clock().elapsed() >= duration,
            };
            if done {
                break;
            }

            if notify {
                state.notifier().notify(1);
            }
            let unit = workload.clone();
            let adapter = self.adapter.clone();
            let unit_state = state.clone();
            units.spawn(async move {
                let output = match unit.run().await {
                    Ok(output) => output,
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        log::error!("Error in work unit: {e:?}");
                        WorkOutput::One(adapter.failure_result(&e))
                    }
                };
                unit_state.pending().push_unit(output);
            });
            while let Some(res) = units.try_join_next() {
                self.absorb(res, state);
            }

            let ctx = PacingContext {
                clock: state.clock(),
                submitted: state.submitted(),
                pending: state.pending(),
            };
            if let Err(e) = rate.apply_pacing(ctx).await {
                return Err((units, e));
            }
        }
        Ok(units)
    }

    async fn drain(&self, mut units: JoinSet<()>, state: &RunState<A>) {
        #[cfg(feature = "tracing")]
        tracing::debug!(outstanding = units.len(), "draining work units");
        while let Some(res) = units.join_next().await {
            self.absorb(res, state);
        }
    }

    /// Account a work unit that did not return normally.
    fn absorb(&self, res: std::result::Result<(), JoinError>, state: &RunState<A>) {
        if let Err(e) = res {
            #[cfg(feature = "tracing")]
            log::error!("Work unit aborted: {e}");
            let error = anyhow!("work unit aborted: {e}");
            state.pending().push_unit([self.adapter.failure_result(&error)]);
        }
    }

    async fn finalize(
        &self,
        context: &ExecutionContext<A::Context>,
        workload: &dyn Workload<A>,
        rate: &mut dyn RateController<A::Result>,
    ) -> anyhow::Result<()> {
        workload.end().await?;
        rate.end().await?;
        self.adapter.release_execution_context(context).await
    }

    fn set_phase(&self, next: RunPhase) {
        let prev = self.phase.send_replace(next);
        debug_assert!(prev.can_transition_to(next), "illegal phase transition {prev} -> {next}");
        #[cfg(feature = "tracing")]
        tracing::debug!(label = %self.settings.label, from = %prev, to = %next, "run phase");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        protocol::Event,
        rate::NoRate,
        trim::tests::{Sum, SumAdapter},
    };

    /// Every unit returns its 1-based sequence number; `fail_at` makes one unit error.
    #[derive(Default)]
    struct Numbered {
        seq: AtomicU64,
        fail_at: Option<u64>,
        fail_init: bool,
        fail_end: bool,
        latency: Duration,
    }

    #[async_trait]
    impl Workload<SumAdapter> for Numbered {
        async fn init(&mut self, _: Arc<ExecutionContext<()>>, _: &Value) -> anyhow::Result<()> {
            if self.fail_init {
                anyhow::bail!("no connection");
            }
            Ok(())
        }

        async fn run(&self) -> anyhow::Result<WorkOutput<u64>> {
            let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            tokio::time::sleep(self.latency).await;
            if self.fail_at == Some(n) {
                anyhow::bail!("unit {n} failed");
            }
            Ok(WorkOutput::One(n))
        }

        async fn end(&self) -> anyhow::Result<()> {
            if self.fail_end {
                anyhow::bail!("teardown broke");
            }
            Ok(())
        }
    }

    /// Sleeps a fixed time per submission and fails on call `fail_at`.
    struct Every {
        period: Duration,
        calls: u64,
        fail_at: Option<u64>,
    }

    impl Every {
        fn new(period: Duration) -> Self {
            Self { period, calls: 0, fail_at: None }
        }
    }

    #[async_trait]
    impl RateController<u64> for Every {
        async fn apply_pacing(&mut self, _: PacingContext<'_, u64>) -> anyhow::Result<()> {
            self.calls += 1;
            if self.fail_at == Some(self.calls) {
                anyhow::bail!("pacing broke");
            }
            tokio::time::sleep(self.period).await;
            Ok(())
        }
    }

    type Events = mpsc::UnboundedReceiver<Event<Sum>>;

    fn new_driver(trim: TrimConfig) -> (TestDriver<SumAdapter>, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = RunSettings {
            label: "test".into(),
            trim,
            report_interval: Duration::from_millis(100),
            ..Default::default()
        };
        (TestDriver::new(Arc::new(SumAdapter::default()), tx, settings), rx)
    }

    fn progress_total(rx: &mut Events) -> (u64, u64) {
        let (mut submitted, mut results) = (0, 0);
        while let Ok(event) = rx.try_recv() {
            if let Event::Progress { submitted_delta, committed } = event {
                submitted += submitted_delta;
                results += committed.count;
            }
        }
        (submitted, results)
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_run_submits_exactly_count() {
        let (driver, mut rx) = new_driver(TrimConfig::None);
        let phase = driver.subscribe_phase();
        let workload = Numbered { latency: Duration::from_millis(30), ..Default::default() };

        let rate = Every::new(Duration::from_millis(50));
        let stats = driver.run_fixed(5, Box::new(workload), Box::new(rate)).await.unwrap();
        assert_eq!(stats, Sum { count: 5, sum: 15 });
        assert_eq!(progress_total(&mut rx), (5, 5));
        assert_eq!(*phase.borrow(), RunPhase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_unit_does_not_stop_the_run() {
        let (driver, mut rx) = new_driver(TrimConfig::None);
        let workload = Numbered { fail_at: Some(3), ..Default::default() };

        let stats = driver.run_fixed(5, Box::new(workload), Box::new(NoRate)).await.unwrap();
        // the failure result of unit 3 counts as 0
        assert_eq!(stats, Sum { count: 5, sum: 12 });
        assert_eq!(progress_total(&mut rx).0, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_count_and_zero_duration_submit_nothing() {
        let (driver, mut rx) = new_driver(TrimConfig::None);
        let stats =
            driver.run_fixed(0, Box::new(Numbered::default()), Box::new(NoRate)).await.unwrap();
        assert_eq!(stats, Sum::default());
        assert!(rx.try_recv().is_err());

        let (driver, mut rx) = new_driver(TrimConfig::None);
        let stats = driver
            .run_duration(Duration::ZERO, Box::new(Numbered::default()), Box::new(NoRate))
            .await
            .unwrap();
        assert_eq!(stats, Sum::default());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn duration_run_stops_submitting_at_deadline() {
        let (driver, mut rx) = new_driver(TrimConfig::None);
        let stats = driver
            .run_duration(
                Duration::from_secs(1),
                Box::new(Numbered::default()),
                Box::new(Every::new(Duration::from_millis(100))),
            )
            .await
            .unwrap();
        assert_eq!(stats.count, 10);
        assert_eq!(progress_total(&mut rx), (10, 10));
    }

    #[tokio::test(start_paused = true)]
    async fn trim_by_count_excludes_first_results() {
        let (driver, _rx) = new_driver(TrimConfig::ByCount(2));
        let stats = driver
            .run_fixed(
                6,
                Box::new(Numbered::default()),
                Box::new(Every::new(Duration::from_millis(60))),
            )
            .await
            .unwrap();
        assert_eq!(stats, Sum { count: 4, sum: 3 + 4 + 5 + 6 });
    }

    #[tokio::test(start_paused = true)]
    async fn init_failure_aborts_before_submission() {
        let (driver, mut rx) = new_driver(TrimConfig::None);
        let phase = driver.subscribe_phase();
        let workload = Numbered { fail_init: true, ..Default::default() };

        let err = driver.run_fixed(5, Box::new(workload), Box::new(NoRate)).await.unwrap_err();
        assert!(matches!(err, WorkerError::Initialization(_)), "{err}");
        assert!(rx.try_recv().is_err());
        assert_eq!(*phase.borrow(), RunPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_failure_still_flushes_launched_units() {
        let (driver, mut rx) = new_driver(TrimConfig::None);
        let phase = driver.subscribe_phase();
        let rate = Every { fail_at: Some(2), ..Every::new(Duration::from_millis(10)) };
        let workload = Numbered { latency: Duration::from_millis(500), ..Default::default() };

        let err = driver.run_fixed(5, Box::new(workload), Box::new(rate)).await.unwrap_err();
        assert!(matches!(err, WorkerError::Submission(_)), "{err}");
        assert_eq!(progress_total(&mut rx), (2, 2));
        assert_eq!(*phase.borrow(), RunPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_failure_fails_the_run_after_reporting() {
        let (driver, mut rx) = new_driver(TrimConfig::None);
        let phase = driver.subscribe_phase();
        let workload = Numbered { fail_end: true, ..Default::default() };

        let err = driver.run_fixed(3, Box::new(workload), Box::new(NoRate)).await.unwrap_err();
        assert!(matches!(err, WorkerError::Finalization(_)), "{err}");
        assert!(err.to_string().contains("teardown broke"), "{err}");
        assert_eq!(progress_total(&mut rx), (3, 3));
        assert_eq!(*phase.borrow(), RunPhase::Failed);
    }
}
