use std::num::NonZeroU32;

use anyhow::Result;
use async_trait::async_trait;

cfg_if::cfg_if! {
    if #[cfg(feature = "rate_limit")] {
        use governor::{
            Quota, RateLimiter,
            middleware::NoOpMiddleware,
            state::{InMemoryState, NotKeyed},
        };
        use nonzero_ext::nonzero;

        use crate::clock::Clock;

        type Limiter =
            RateLimiter<NotKeyed, InMemoryState, Clock, NoOpMiddleware<std::time::Instant>>;
    } else {
        use anyhow::Context as _;
        use tokio::time::Duration;
    }
}

use super::{PacingContext, RateController};

/// Submits at a constant rate of `tps` work units per second, without bursts.
pub struct FixedRate {
    tps: NonZeroU32,
    #[cfg(feature = "rate_limit")]
    limiter: Option<Limiter>,
}

impl FixedRate {
    /// Create a controller for `tps` submissions per second.
    pub fn new(tps: NonZeroU32) -> Self {
        Self {
            tps,
            #[cfg(feature = "rate_limit")]
            limiter: None,
        }
    }

    /// The configured rate.
    pub fn tps(&self) -> NonZeroU32 {
        self.tps
    }
}

impl std::fmt::Debug for FixedRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedRate").field("tps", &self.tps).finish_non_exhaustive()
    }
}

#[async_trait]
impl<R: Send + Sync> RateController<R> for FixedRate {
    async fn apply_pacing(&mut self, ctx: PacingContext<'_, R>) -> Result<()> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "rate_limit")] {
                let tps = self.tps;
                // anchored on the run clock, which only exists once submission started
                let limiter = self.limiter.get_or_insert_with(|| {
                    let quota = Quota::per_second(tps).allow_burst(nonzero!(1u32));
                    let limiter = RateLimiter::direct_with_clock(quota, *ctx.clock);
                    // the unit launched before the first pacing call takes the initial cell
                    let _ = limiter.check();
                    limiter
                });
                limiter.until_ready().await;
            } else {
                let secs = ctx.submitted as f64 / f64::from(self.tps.get());
                let next = Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("fixed-rate offset of {secs}s"))?;
                ctx.clock.sleep_until(next).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{buffer::ResultBuffer, clock::Clock};
    use nonzero_ext::nonzero;
    use tokio::time::{Duration, Instant};

    #[tokio::test]
    async fn spaces_submissions_by_rate() {
        let clock = Clock::start_now();
        let pending = ResultBuffer::<()>::new();
        let mut rate = FixedRate::new(nonzero!(100u32));

        let t = Instant::now();
        for submitted in 1..=5 {
            let ctx = PacingContext { clock: &clock, submitted, pending: &pending };
            RateController::<()>::apply_pacing(&mut rate, ctx).await.unwrap();
        }
        // five intervals of 10ms, one per pacing call
        assert!(t.elapsed() >= Duration::from_millis(45), "elapsed {:?}", t.elapsed());
    }
}
