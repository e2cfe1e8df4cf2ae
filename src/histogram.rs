//! A simple wrapper around [`hdrhistogram::Histogram`] for latency measurements.
use std::time::Duration;

use hdrhistogram::Histogram;

pub(crate) const PERCENTAGES: &[f64] = &[50.0, 75.0, 90.0, 95.0, 99.0, 99.9];

/// A mergeable latency histogram with nanosecond resolution.
#[derive(Clone, Debug)]
pub struct LatencyHistogram {
    hist: Histogram<u64>,
}

impl LatencyHistogram {
    /// Creates a new, auto-resizing latency histogram.
    pub fn new() -> LatencyHistogram {
        Self { hist: Histogram::<u64>::new(3).expect("create histogram") }
    }

    /// Records a latency value, growing the trackable range as needed.
    pub fn record(&mut self, d: Duration) {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        if let Err(_e) = self.hist.record(nanos) {
            #[cfg(feature = "tracing")]
            log::warn!("Failed to record latency {d:?}: {_e}");
        }
    }

    /// Adds every recorded value of `other` into this histogram.
    pub fn merge(&mut self, other: &LatencyHistogram) {
        // auto-resizing histograms accept any addend
        if let Err(_e) = self.hist.add(&other.hist) {
            #[cfg(feature = "tracing")]
            log::warn!("Failed to merge latency histograms: {_e}");
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> u64 {
        self.hist.len()
    }

    /// Returns true if this histogram has no recorded values.
    pub fn is_empty(&self) -> bool {
        self.hist.is_empty()
    }

    /// Get the latency at a given quantile.
    pub fn value_at_quantile(&self, q: f64) -> Duration {
        Duration::from_nanos(self.hist.value_at_quantile(q))
    }

    /// Compute each latency value at the given percentages.
    pub fn percentiles<'a>(
        &'a self,
        percentages: &'a [f64],
    ) -> impl Iterator<Item = (f64, Duration)> + 'a {
        percentages.iter().map(|&p| (p, self.value_at_quantile(p / 100.0)))
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_counts() {
        let mut a = LatencyHistogram::new();
        let mut b = LatencyHistogram::new();
        for ms in 1..=10 {
            a.record(Duration::from_millis(ms));
        }
        for ms in 11..=20 {
            b.record(Duration::from_millis(ms));
        }

        a.merge(&b);
        assert_eq!(a.len(), 20);
        let median = a.value_at_quantile(0.5);
        assert!(median >= Duration::from_millis(9) && median <= Duration::from_millis(11));
    }

    #[test]
    fn range_grows_with_recorded_values() {
        let mut hist = LatencyHistogram::new();
        hist.record(Duration::from_micros(250));
        hist.record(Duration::from_secs(3600));
        assert_eq!(hist.len(), 2);

        let low = hist.value_at_quantile(0.0);
        let high = hist.value_at_quantile(1.0);
        assert!(low >= Duration::from_micros(249) && low <= Duration::from_micros(251), "{low:?}");
        assert!(high >= Duration::from_secs(3596) && high <= Duration::from_secs(3604), "{high:?}");
    }

    #[test]
    fn percentiles_follow_recorded_latencies() {
        let mut hist = LatencyHistogram::new();
        for ms in 1..=100 {
            hist.record(Duration::from_millis(ms));
        }

        let got: Vec<_> = hist.percentiles(&[50.0, 90.0]).collect();
        assert_eq!(got.len(), 2);
        for ((p, latency), want) in got.into_iter().zip([50, 90]) {
            let want = Duration::from_millis(want);
            let slack = Duration::from_micros(100);
            assert!(latency + slack >= want && latency <= want + slack, "p{p}: {latency:?}");
        }
    }
}
