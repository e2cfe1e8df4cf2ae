use anyhow::Result;
use async_trait::async_trait;

use super::{PacingContext, RateController};

/// Submits as fast as possible, yielding to the scheduler between submissions
/// so completions and report ticks still get to run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRate;

#[async_trait]
impl<R: Send + Sync> RateController<R> for NoRate {
    async fn apply_pacing(&mut self, _ctx: PacingContext<'_, R>) -> Result<()> {
        tokio::task::yield_now().await;
        Ok(())
    }
}
