//! Built-in work result and statistics snapshot types.
//!
//! The worker core treats results and snapshots as opaque; any
//! [`TargetAdapter`](crate::adapter::TargetAdapter) may bring its own. The
//! types here cover the common case of a transaction that either commits or
//! fails after some latency, and are what most adapters return.
//!
//! # Key Types
//!
//! - [`TxOutcome`] - The outcome of one transaction.
//! - [`TxStats`] - Aggregated statistics over a batch of outcomes, mergeable.

mod counter;

pub use counter::Counter;

use std::{collections::BTreeMap, time::Duration};

use serde::Serialize;

use crate::{
    histogram::{LatencyHistogram, PERCENTAGES},
    status::{TxStatus, TxStatusKind},
};

/// The outcome of a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutcome {
    /// The final status of the transaction.
    pub status: TxStatus,
    /// Time between submission and the final status.
    pub latency: Duration,
}

impl TxOutcome {
    /// Creates a committed outcome.
    pub fn committed(latency: Duration) -> Self {
        Self { status: TxStatus::committed(0), latency }
    }

    /// Creates a failed outcome.
    pub fn failed(code: i64, latency: Duration) -> Self {
        Self { status: TxStatus::failed(code), latency }
    }
}

/// Statistics over a batch of [`TxOutcome`]s.
///
/// Latency figures cover committed transactions only. Snapshots are merged
/// with [`TxStats::merge`], which is associative: merging the snapshots of any
/// chronological partition of a batch equals the snapshot of the whole batch.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxStats {
    /// Number of outcomes.
    pub total: u64,
    /// Number of committed outcomes.
    pub committed: u64,
    /// Number of failed outcomes.
    pub failed: u64,
    /// Number of timed-out outcomes.
    pub timed_out: u64,
    /// Latency of committed outcomes.
    pub latency: Counter,
    /// Per-status counts, present for detailed snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_status: Option<BTreeMap<String, u64>>,
    #[serde(skip)]
    hist: LatencyHistogram,
}

impl TxStats {
    /// Computes a snapshot over `batch`. A `detailed` snapshot also carries
    /// the per-status breakdown.
    pub fn from_batch(batch: &[TxOutcome], detailed: bool) -> Self {
        let mut stats = Self { by_status: detailed.then(BTreeMap::new), ..Self::default() };
        for outcome in batch {
            stats.record(outcome);
        }
        stats
    }

    fn record(&mut self, outcome: &TxOutcome) {
        self.total += 1;
        match outcome.status.kind() {
            TxStatusKind::Committed => {
                self.committed += 1;
                self.latency.record(outcome.latency);
                self.hist.record(outcome.latency);
            }
            TxStatusKind::Failed => self.failed += 1,
            TxStatusKind::TimedOut => self.timed_out += 1,
        }
        if let Some(by_status) = &mut self.by_status {
            *by_status.entry(outcome.status.to_string()).or_default() += 1;
        }
    }

    /// Combines an earlier snapshot with a later one.
    pub fn merge(&self, later: &TxStats) -> TxStats {
        let mut merged = self.clone();
        merged.total += later.total;
        merged.committed += later.committed;
        merged.failed += later.failed;
        merged.timed_out += later.timed_out;
        merged.latency += &later.latency;
        merged.hist.merge(&later.hist);
        merged.by_status = match (&self.by_status, &later.by_status) {
            (None, None) => None,
            (a, b) => {
                let mut by_status = a.clone().unwrap_or_default();
                for (status, n) in b.iter().flatten() {
                    *by_status.entry(status.clone()).or_default() += n;
                }
                Some(by_status)
            }
        };
        merged
    }

    /// Returns `true` if no outcome was recorded.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Ratio of committed outcomes to all outcomes.
    pub fn commit_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.committed as f64 / self.total as f64
    }

    /// Latency percentiles of committed outcomes, keyed `p50`, `p99`, ...
    pub fn percentiles(&self) -> BTreeMap<String, Duration> {
        if self.hist.is_empty() {
            return BTreeMap::new();
        }
        self.hist.percentiles(PERCENTAGES).map(|(p, v)| (format!("p{p}"), v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes() -> Vec<TxOutcome> {
        vec![
            TxOutcome::committed(Duration::from_millis(10)),
            TxOutcome::failed(500, Duration::from_millis(3)),
            TxOutcome::committed(Duration::from_millis(30)),
            TxOutcome { status: TxStatus::timed_out(), latency: Duration::from_secs(5) },
            TxOutcome::committed(Duration::from_millis(20)),
        ]
    }

    #[test]
    fn from_batch_counts_by_kind() {
        let stats = TxStats::from_batch(&outcomes(), false);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.committed, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.latency.min, Some(Duration::from_millis(10)));
        assert_eq!(stats.latency.max, Some(Duration::from_millis(30)));
        assert_eq!(stats.latency.mean(), Some(Duration::from_millis(20)));
        assert!(stats.by_status.is_none());
    }

    #[test]
    fn merge_of_partitions_equals_whole() {
        let batch = outcomes();
        let whole = TxStats::from_batch(&batch, true);
        for split in 0..=batch.len() {
            let (head, tail) = batch.split_at(split);
            let merged = TxStats::from_batch(head, true).merge(&TxStats::from_batch(tail, true));
            assert_eq!(merged.total, whole.total);
            assert_eq!(merged.committed, whole.committed);
            assert_eq!(merged.latency, whole.latency);
            assert_eq!(merged.by_status, whole.by_status);
        }
    }

    #[test]
    fn merge_with_null_snapshot_is_identity() {
        let stats = TxStats::from_batch(&outcomes(), false);
        let merged = TxStats::default().merge(&stats);
        assert_eq!(merged.total, stats.total);
        assert_eq!(merged.latency, stats.latency);
        assert_eq!(merged.percentiles(), stats.percentiles());
    }

    #[test]
    fn percentiles_track_committed_latencies() {
        let batch = outcomes();
        let (head, tail) = batch.split_at(2);
        let stats = TxStats::from_batch(head, false).merge(&TxStats::from_batch(tail, false));

        let percentiles = stats.percentiles();
        let within = |key: &str, ms: u64| {
            let got = percentiles[key];
            let want = Duration::from_millis(ms);
            got + Duration::from_micros(50) >= want && got <= want + Duration::from_micros(50)
        };
        assert!(within("p50", 20), "{percentiles:?}");
        assert!(within("p99.9", 30), "{percentiles:?}");
    }

    #[test]
    fn serializes_camel_case_without_histogram() {
        let stats = TxStats::from_batch(&outcomes(), true);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["timedOut"], 1);
        assert_eq!(json["latency"]["count"], 3);
        assert_eq!(json["byStatus"]["Committed(0)"], 3);
        assert!(json.get("hist").is_none());
    }

    #[test]
    fn empty_snapshot() {
        let stats = TxStats::default();
        assert!(stats.is_empty());
        assert_eq!(stats.commit_ratio(), 0.0);
        assert!(stats.percentiles().is_empty());
        assert_eq!(stats.latency.mean(), None);
    }
}
