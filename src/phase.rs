//! Lifecycle phases of a test run.
use strum::{Display, IntoStaticStr};

/// Lifecycle phase of a single test run.
///
/// State transitions:
/// `Idle → Initializing → Submitting → Draining → Finalizing → Completed`,
/// with `Failed` reachable from `Initializing`, `Submitting`, `Draining` and `Finalizing`.
/// `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RunPhase {
    /// No run has started yet.
    #[default]
    Idle,
    /// Execution context, workload and rate controller are being set up.
    Initializing,
    /// The submission loop is launching work units.
    Submitting,
    /// Waiting for outstanding work units to complete.
    Draining,
    /// Workload, rate controller and execution context are being torn down.
    Finalizing,
    /// The run finished and produced final statistics (terminal).
    Completed,
    /// The run was aborted by an error (terminal).
    Failed,
}

impl RunPhase {
    /// Returns `true` if the phase is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` if the periodic reporter should be running in this phase.
    pub fn is_reporting(self) -> bool {
        matches!(self, Self::Submitting | Self::Draining)
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::{Completed, Draining, Failed, Finalizing, Idle, Initializing, Submitting};
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Submitting)
                | (Submitting, Draining)
                | (Draining, Finalizing)
                | (Finalizing, Completed)
                | (Initializing | Submitting | Draining | Finalizing, Failed)
        )
    }
}
