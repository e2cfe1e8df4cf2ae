//! Outcome status of a single transaction.
use std::fmt;

/// Represents the kind of transaction status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TxStatusKind {
    /// The transaction was accepted by the target system.
    Committed,
    /// The target system rejected the transaction or the request errored.
    Failed,
    /// No answer arrived within the workload's deadline.
    TimedOut,
}

/// The transaction status: a kind plus a target-specific code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxStatus {
    kind: TxStatusKind,
    code: i64,
}

impl TxStatus {
    fn new(kind: TxStatusKind, code: i64) -> Self {
        Self { kind, code }
    }

    /// Creates a committed status.
    pub fn committed(code: i64) -> Self {
        Self::new(TxStatusKind::Committed, code)
    }

    /// Creates a failed status.
    pub fn failed(code: i64) -> Self {
        Self::new(TxStatusKind::Failed, code)
    }

    /// Creates a timed-out status.
    pub fn timed_out() -> Self {
        Self::new(TxStatusKind::TimedOut, 0)
    }

    /// Returns the kind of the status.
    pub fn kind(&self) -> TxStatusKind {
        self.kind
    }

    /// Returns the code of the status.
    pub fn code(&self) -> i64 {
        self.code
    }

    /// Returns `true` if the transaction counts as committed.
    pub fn is_committed(&self) -> bool {
        self.kind == TxStatusKind::Committed
    }
}

impl fmt::Display for TxStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed => write!(f, "Committed"),
            Self::Failed => write!(f, "Failed"),
            Self::TimedOut => write!(f, "Timed Out"),
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.code)
    }
}
