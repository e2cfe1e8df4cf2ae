//! The command/event channel handler.
//!
//! A [`Worker`] turns `test` commands into test runs and reports their outcome
//! as events. It handles one run at a time: a `test` command received while a
//! run is active is rejected with an `error` event and the active run goes on.
//! For every `test` command exactly one `result` or `error` event is sent,
//! preceded by zero or more `progress` events.
use std::sync::Arc;

use serde_json::Value;
use tokio::{
    io::{AsyncBufRead, AsyncWrite},
    select,
    sync::mpsc,
    task::{JoinError, JoinHandle},
    time::Duration,
};

use crate::{
    adapter::TargetAdapter,
    driver::{RunSettings, TestDriver},
    error::WorkerError,
    protocol::{self, Command, Event, EventSender, TestMessage},
    rate::RateControlConfig,
    workload::WorkloadRegistry,
    Result,
};

/// Worker-wide defaults applied to every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOpts {
    /// Interval of the periodic reporter.
    pub report_interval: Duration,
    /// Compute detailed snapshots unless a command says otherwise.
    pub detailed_stats: bool,
}

impl Default for WorkerOpts {
    fn default() -> Self {
        Self { report_interval: Duration::from_secs(1), detailed_stats: false }
    }
}

type Connect<A> = Box<dyn Fn(&Value) -> anyhow::Result<A> + Send + Sync>;

type ActiveRun<S> = JoinHandle<Result<S>>;

/// Executes test runs on behalf of a coordinating process.
pub struct Worker<A: TargetAdapter> {
    connect: Connect<A>,
    workloads: WorkloadRegistry<A>,
    opts: WorkerOpts,
}

impl<A: TargetAdapter> Worker<A> {
    /// Create a worker. `connect` builds the target adapter from the
    /// `targetConfig` of each `test` command.
    pub fn new<F>(connect: F, workloads: WorkloadRegistry<A>, opts: WorkerOpts) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<A> + Send + Sync + 'static,
    {
        Self { connect: Box::new(connect), workloads, opts }
    }

    /// The worker-wide defaults.
    pub fn opts(&self) -> &WorkerOpts {
        &self.opts
    }

    /// Handle raw commands until the command channel is closed and the active
    /// run, if any, has finished.
    ///
    /// Returns early if the event receiver is dropped.
    pub async fn run(
        &self,
        mut commands: mpsc::UnboundedReceiver<String>,
        events: EventSender<A::Snapshot>,
    ) {
        let mut active: Option<ActiveRun<A::Snapshot>> = None;
        loop {
            select! {
                res = join_active(&mut active), if active.is_some() => {
                    active = None;
                    if events.send(outcome(res)).is_err() {
                        return;
                    }
                }
                raw = commands.recv() => {
                    let Some(raw) = raw else { break };
                    match self.handle(&raw, active.is_some(), &events) {
                        Ok(run) => active = Some(run),
                        Err(e) => {
                            #[cfg(feature = "tracing")]
                            log::warn!("Rejected command: {e}");
                            if events.send(Event::error(&e)).is_err() {
                                abort(active);
                                return;
                            }
                        }
                    }
                }
            }
        }

        if let Some(run) = active {
            let _ = events.send(outcome(run.await));
        }
    }

    /// Serve commands read as JSON lines from `reader`, writing events as JSON
    /// lines to `writer`.
    ///
    /// Unreadable lines (too long, not UTF-8) are answered with an `error`
    /// event. Returns once the reader reached end of stream and the active run
    /// finished, or when reading or writing fails.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let reader_events = event_tx.clone();
        let read = async move {
            let mut reader = reader;
            loop {
                match protocol::read_line(&mut reader).await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        if cmd_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e @ WorkerError::Protocol(_)) => {
                        #[cfg(feature = "tracing")]
                        log::warn!("Unreadable command: {e}");
                        let _ = reader_events.send(Event::error(&e));
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok::<_, WorkerError>(())
        };
        let handle = async {
            self.run(cmd_rx, event_tx).await;
            Ok::<_, WorkerError>(())
        };
        let write = async {
            while let Some(event) = event_rx.recv().await {
                protocol::write_event(&mut writer, &event).await?;
            }
            Ok::<_, WorkerError>(())
        };

        tokio::try_join!(read, handle, write)?;
        Ok(())
    }

    fn handle(
        &self,
        raw: &str,
        busy: bool,
        events: &EventSender<A::Snapshot>,
    ) -> Result<ActiveRun<A::Snapshot>> {
        match Command::parse(raw)? {
            Command::Test(_) if busy => Err(WorkerError::RunInProgress),
            Command::Test(msg) => self.launch(*msg, events.clone()),
        }
    }

    /// Validate a `test` command and start its run.
    fn launch(
        &self,
        msg: TestMessage,
        events: EventSender<A::Snapshot>,
    ) -> Result<ActiveRun<A::Snapshot>> {
        let bound = msg.bound()?;
        let trim = msg.trim_config(bound)?;
        let rate = RateControlConfig::from_value(&msg.rate_control_config)?;
        let workload = self.workloads.create(&msg.workload_module)?;
        let adapter = (self.connect)(&msg.target_config).map_err(WorkerError::Initialization)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            label = %msg.label,
            workload = %msg.workload_module,
            ?bound,
            ?trim,
            ?rate,
            "starting test run"
        );

        let settings = RunSettings {
            label: msg.label,
            client_args: msg.client_args,
            workload_args: msg.workload_args,
            trim,
            detailed: msg.detailed.unwrap_or(self.opts.detailed_stats),
            report_interval: self.opts.report_interval,
        };
        let driver = TestDriver::new(Arc::new(adapter), events, settings);
        Ok(tokio::spawn(driver.run(bound, workload, rate.build())))
    }
}

async fn join_active<S>(
    active: &mut Option<ActiveRun<S>>,
) -> std::result::Result<Result<S>, JoinError> {
    match active {
        Some(run) => run.await,
        None => std::future::pending().await,
    }
}

fn outcome<S>(res: std::result::Result<Result<S>, JoinError>) -> Event<S> {
    match res {
        Ok(Ok(stats)) => Event::Result { data: stats },
        Ok(Err(e)) => {
            #[cfg(feature = "tracing")]
            log::error!("Test run failed: {e}");
            Event::error(&e)
        }
        Err(e) => {
            #[cfg(feature = "tracing")]
            log::error!("Test run aborted: {e}");
            Event::Error { data: format!("test run aborted: {e}") }
        }
    }
}

fn abort<S>(active: Option<ActiveRun<S>>) {
    if let Some(run) = active {
        #[cfg(feature = "tracing")]
        log::warn!("Event channel closed, aborting the active test run");
        run.abort();
    }
}
