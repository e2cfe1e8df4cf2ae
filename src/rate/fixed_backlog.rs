use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Duration;

use super::{PacingContext, RateController};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Closed-loop control: holds submission while the number of submitted but
/// unfinished work units is at or above the target backlog.
#[derive(Debug, Clone, Copy)]
pub struct FixedBacklog {
    unfinished: u64,
}

impl FixedBacklog {
    /// Create a controller keeping `unfinished` work units in flight (at least one).
    pub fn new(unfinished: u64) -> Self {
        Self { unfinished: unfinished.max(1) }
    }
}

#[async_trait]
impl<R: Send + Sync> RateController<R> for FixedBacklog {
    async fn apply_pacing(&mut self, ctx: PacingContext<'_, R>) -> Result<()> {
        tokio::task::yield_now().await;
        while ctx.submitted.saturating_sub(ctx.pending.completed()) >= self.unfinished {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }
}
