use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::time::Duration;

use super::{PacingContext, RateController};
use crate::driver::{RunBound, RunConfig};

/// Ramps the submission rate linearly from `starting_tps` to `finishing_tps`.
///
/// Progress through the ramp is measured against the run bound: submitted
/// count over the target count, or elapsed time over the target duration.
#[derive(Debug, Clone)]
pub struct LinearRate {
    starting_tps: f64,
    finishing_tps: f64,
    bound: Option<RunBound>,
    next: Duration,
}

impl LinearRate {
    /// Create a ramp between two rates, in transactions per second.
    pub fn new(starting_tps: f64, finishing_tps: f64) -> Self {
        Self { starting_tps, finishing_tps, bound: None, next: Duration::ZERO }
    }

    fn current_tps(&self, submitted: u64, elapsed: Duration) -> f64 {
        let progress = match self.bound {
            Some(RunBound::Count(n)) if n > 0 => submitted as f64 / n as f64,
            Some(RunBound::Duration(d)) if !d.is_zero() => elapsed.as_secs_f64() / d.as_secs_f64(),
            _ => 1.0,
        }
        .clamp(0.0, 1.0);
        self.starting_tps + (self.finishing_tps - self.starting_tps) * progress
    }
}

#[async_trait]
impl<R: Send + Sync> RateController<R> for LinearRate {
    async fn init(&mut self, run: &RunConfig) -> Result<()> {
        self.bound = Some(run.bound);
        self.next = Duration::ZERO;
        Ok(())
    }

    async fn apply_pacing(&mut self, ctx: PacingContext<'_, R>) -> Result<()> {
        let tps = self.current_tps(ctx.submitted, ctx.clock.elapsed());
        if !(tps.is_finite() && tps > 0.0) {
            tokio::task::yield_now().await;
            return Ok(());
        }
        let step = Duration::try_from_secs_f64(1.0 / tps)
            .with_context(|| format!("linear-rate interval at {tps} tps"))?;
        self.next = self
            .next
            .checked_add(step)
            .ok_or_else(|| anyhow!("linear-rate schedule overflowed at {tps} tps"))?;
        ctx.clock.sleep_until(self.next).await;
        Ok(())
    }
}
