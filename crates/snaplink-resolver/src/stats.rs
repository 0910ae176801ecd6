use jiff::Timestamp;
use snaplink_core::cache::Result;
use snaplink_core::{LinkCache, ShortCode, StatsEntry};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Keeps per-code usage counters in the cache between reconciliations.
///
/// Updates are read-modify-write without any lock: two hits racing on the
/// same code can lose an increment.
#[derive(Debug)]
pub struct StatsAccumulator<C: ?Sized> {
    cache: Arc<C>,
    ttl: Duration,
}

impl<C: LinkCache + ?Sized> StatsAccumulator<C> {
    /// `ttl` should outlive the resolution entry TTL so the write-back
    /// pipeline still finds the stats when the entry expires.
    pub fn new(cache: Arc<C>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Counts one hit at `now` on the pending stats.
    ///
    /// Returns `None` without writing anything when no stats are pending; the
    /// caller must [`seed`](Self::seed) from the durable count instead, since
    /// starting over at 1 would be discarded by the monotonic write-back.
    pub async fn record_hit(&self, code: &ShortCode, now: Timestamp) -> Result<Option<StatsEntry>> {
        let Some(pending) = self.cache.get_stats(code).await? else {
            return Ok(None);
        };

        let stats = pending.hit(now);
        self.cache.set_stats(code, &stats, self.ttl).await?;
        trace!(code = %code, clicks = stats.clicks, "Recorded hit");
        Ok(Some(stats))
    }

    /// Starts counting from `baseline_clicks` plus the hit being served.
    pub async fn seed(&self, code: &ShortCode, baseline_clicks: u64, now: Timestamp) -> Result<StatsEntry> {
        let stats = StatsEntry::seeded(baseline_clicks, now);

        self.cache.set_stats(code, &stats, self.ttl).await?;
        trace!(code = %code, clicks = stats.clicks, "Seeded stats");
        Ok(stats)
    }

    pub async fn peek(&self, code: &ShortCode) -> Result<Option<StatsEntry>> {
        self.cache.get_stats(code).await
    }

    /// Takes the pending stats and evicts both cache keys of `code`.
    pub async fn drain(&self, code: &ShortCode) -> Result<Option<StatsEntry>> {
        let pending = self.cache.get_stats(code).await?;
        self.cache.invalidate(code).await?;
        Ok(pending)
    }
}
