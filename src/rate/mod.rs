//! Rate control: when the driver may submit the next work unit.
//!
//! The driver calls [`RateController::apply_pacing`] after launching each work
//! unit; the returned future is the only suspension point of the submission
//! loop, so the controller alone decides inter-submission timing.
//!
//! Controllers are usually built from the `rateControlConfig` of a `test`
//! command via [`RateControlConfig`]:
//!
//! ```json
//! { "type": "fixed-rate", "opts": { "tps": 50 } }
//! ```
mod fixed_backlog;
mod fixed_rate;
mod linear_rate;
mod no_rate;

pub use fixed_backlog::FixedBacklog;
pub use fixed_rate::FixedRate;
pub use linear_rate::LinearRate;
pub use no_rate::NoRate;

use std::num::NonZeroU32;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{buffer::ResultBuffer, clock::Clock, driver::RunConfig, error::WorkerError};

/// What a controller sees of the run at each pacing call.
#[derive(Debug)]
pub struct PacingContext<'a, R> {
    /// The run clock, anchored at the start of submission.
    pub clock: &'a Clock,
    /// Number of submitted requests so far.
    pub submitted: u64,
    /// Results completed but not yet drained by the reporter.
    pub pending: &'a ResultBuffer<R>,
}

/// Paces the submission loop.
#[async_trait]
pub trait RateController<R: Send + Sync>: Send {
    /// Prepare the controller for a run.
    #[allow(unused_variables)]
    async fn init(&mut self, run: &RunConfig) -> Result<()> {
        Ok(())
    }

    /// Wait until the next work unit may be submitted.
    async fn apply_pacing(&mut self, ctx: PacingContext<'_, R>) -> Result<()>;

    /// Release controller resources after the run.
    async fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Serialized configuration of the built-in controllers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "opts", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RateControlConfig {
    /// Submit as fast as the scheduler allows.
    NoRate,
    /// Submit at a constant rate.
    FixedRate {
        /// Target transactions per second.
        tps: NonZeroU32,
    },
    /// Ramp the rate linearly over the length of the run.
    LinearRate {
        /// Rate at the start of the run.
        starting_tps: f64,
        /// Rate at the end of the run.
        finishing_tps: f64,
    },
    /// Keep a fixed number of submitted but unfinished work units in flight.
    FixedBacklog {
        /// Target number of unfinished work units.
        unfinished_per_client: u64,
    },
}

impl RateControlConfig {
    /// Parse the `rateControlConfig` of a command. `null` selects [`NoRate`].
    pub fn from_value(value: &Value) -> crate::Result<Self> {
        if value.is_null() {
            return Ok(Self::NoRate);
        }
        let config = Self::deserialize(value)
            .map_err(|e| WorkerError::Protocol(format!("rateControlConfig: {e}")))?;
        if let Self::LinearRate { starting_tps, finishing_tps } = config
            && !(starting_tps.is_finite()
                && finishing_tps.is_finite()
                && starting_tps > 0.0
                && finishing_tps > 0.0)
        {
            return Err(WorkerError::Protocol(
                "rateControlConfig: linear-rate tps must be positive".into(),
            ));
        }
        Ok(config)
    }

    /// Build the configured controller.
    pub fn build<R: Send + Sync + 'static>(&self) -> Box<dyn RateController<R>> {
        match *self {
            Self::NoRate => Box::new(NoRate),
            Self::FixedRate { tps } => Box::new(FixedRate::new(tps)),
            Self::LinearRate { starting_tps, finishing_tps } => {
                Box::new(LinearRate::new(starting_tps, finishing_tps))
            }
            Self::FixedBacklog { unfinished_per_client } => {
                Box::new(FixedBacklog::new(unfinished_per_client))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nonzero_ext::nonzero;
    use serde_json::json;

    #[test]
    fn parses_builtin_controllers() {
        assert_eq!(RateControlConfig::from_value(&Value::Null).unwrap(), RateControlConfig::NoRate);
        assert_eq!(
            RateControlConfig::from_value(&json!({ "type": "no-rate" })).unwrap(),
            RateControlConfig::NoRate
        );
        assert_eq!(
            RateControlConfig::from_value(&json!({ "type": "fixed-rate", "opts": { "tps": 20 } }))
                .unwrap(),
            RateControlConfig::FixedRate { tps: nonzero!(20u32) }
        );
        assert_eq!(
            RateControlConfig::from_value(&json!({
                "type": "linear-rate",
                "opts": { "startingTps": 5.0, "finishingTps": 10.0 }
            }))
            .unwrap(),
            RateControlConfig::LinearRate { starting_tps: 5.0, finishing_tps: 10.0 }
        );
        assert_eq!(
            RateControlConfig::from_value(&json!({
                "type": "fixed-backlog",
                "opts": { "unfinishedPerClient": 4 }
            }))
            .unwrap(),
            RateControlConfig::FixedBacklog { unfinished_per_client: 4 }
        );
    }

    #[test]
    fn rejects_unknown_or_invalid_controllers() {
        let unknown = RateControlConfig::from_value(&json!({ "type": "zigzag" }));
        assert!(matches!(unknown, Err(WorkerError::Protocol(_))));

        let zero_tps =
            RateControlConfig::from_value(&json!({ "type": "fixed-rate", "opts": { "tps": 0 } }));
        assert!(matches!(zero_tps, Err(WorkerError::Protocol(_))));

        let negative = RateControlConfig::from_value(&json!({
            "type": "linear-rate",
            "opts": { "startingTps": -1.0, "finishingTps": 10.0 }
        }));
        assert!(matches!(negative, Err(WorkerError::Protocol(_))));
    }
}
