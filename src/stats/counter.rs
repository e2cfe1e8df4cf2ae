use std::time::Duration;

use serde::{Serialize, Serializer};

/// Count, sum and range of a set of latencies.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counter {
    /// Number of recorded latencies.
    pub count: u64,
    /// Sum of recorded latencies, serialized in seconds.
    #[serde(serialize_with = "as_secs")]
    pub sum: Duration,
    /// Smallest recorded latency.
    #[serde(serialize_with = "opt_as_secs")]
    pub min: Option<Duration>,
    /// Largest recorded latency.
    #[serde(serialize_with = "opt_as_secs")]
    pub max: Option<Duration>,
}

impl Counter {
    /// Records one latency.
    pub fn record(&mut self, latency: Duration) {
        self.count += 1;
        self.sum += latency;
        self.min = Some(self.min.map_or(latency, |m| m.min(latency)));
        self.max = Some(self.max.map_or(latency, |m| m.max(latency)));
    }

    /// Average of recorded latencies, `None` if nothing was recorded.
    pub fn mean(&self) -> Option<Duration> {
        let nanos = self.sum.as_nanos().checked_div(u128::from(self.count))?;
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }
}

impl std::ops::AddAssign<&Counter> for Counter {
    fn add_assign(&mut self, rhs: &Counter) {
        self.count += rhs.count;
        self.sum += rhs.sum;
        self.min = match (self.min, rhs.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, rhs.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn opt_as_secs<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}
