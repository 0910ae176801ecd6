use crate::error::Result;
use crate::stats::StatsAccumulator;
use jiff::Timestamp;
use snaplink_core::{CacheEntry, LinkCache, LinkRecord, Repository, ShortCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

/// Default lifetime of a resolution entry in the cache.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
/// Default lifetime of pending stats; longer than [`DEFAULT_CACHE_TTL`].
pub const DEFAULT_STATS_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, TypedBuilder)]
pub struct ResolverSettings {
    #[builder(default = DEFAULT_CACHE_TTL)]
    pub cache_ttl: Duration,
    #[builder(default = DEFAULT_STATS_TTL)]
    pub stats_ttl: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Outcome of resolving a short code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Redirect to this target.
    Redirect(String),
    NotFound,
    /// The code exists but its expiry has passed.
    Gone,
}

#[derive(Debug)]
enum CacheLookup {
    HitValid(CacheEntry),
    HitExpired,
    Miss,
}

#[derive(Debug)]
enum StoreLookup {
    FoundValid(LinkRecord),
    FoundExpired,
    NotFound,
}

/// Cache-aside resolution of short codes.
///
/// A valid cache hit is answered from the cache and counted in the pending
/// stats. Anything else goes to the store; a valid store hit re-seeds both the
/// resolution entry and the stats. An entry that the cache still holds after
/// the link expired has its pending stats flushed to the store before the
/// store decides.
#[derive(Debug)]
pub struct ResolutionEngine<R: ?Sized, C: ?Sized> {
    repository: Arc<R>,
    cache: Arc<C>,
    stats: StatsAccumulator<C>,
    cache_ttl: Duration,
}

impl<R, C> ResolutionEngine<R, C>
where
    R: Repository + ?Sized,
    C: LinkCache + ?Sized,
{
    pub fn new(repository: Arc<R>, cache: Arc<C>, settings: ResolverSettings) -> Self {
        Self {
            stats: StatsAccumulator::new(cache.clone(), settings.stats_ttl),
            repository,
            cache,
            cache_ttl: settings.cache_ttl,
        }
    }

    /// The accumulator this engine counts hits with.
    pub fn stats(&self) -> &StatsAccumulator<C> {
        &self.stats
    }

    pub async fn resolve(&self, code: &ShortCode) -> Result<Resolution> {
        let now = Timestamp::now();
        trace!(code = %code, "Resolving short code");

        match self.lookup_cache(code, now).await? {
            CacheLookup::HitValid(entry) => {
                if self.stats.record_hit(code, now).await?.is_none() {
                    // Stats were written back while the entry stayed cached.
                    let baseline = self.repository.get(code).await?.map_or(0, |r| r.clicks);
                    self.stats.seed(code, baseline, now).await?;
                    debug!(code = %code, baseline, "Re-seeded stats of a cached entry");
                }
                debug!(code = %code, state = "hit_valid", "Resolved from cache");
                return Ok(Resolution::Redirect(entry.original_url));
            }
            CacheLookup::HitExpired => {
                debug!(code = %code, state = "hit_expired", "Cached entry outlived its link");
                self.flush_expired(code).await?;
            }
            CacheLookup::Miss => {
                trace!(code = %code, state = "miss", "Cache miss");
            }
        }

        match self.lookup_store(code, now).await? {
            StoreLookup::FoundValid(record) => {
                self.cache
                    .set_entry(code, &CacheEntry::from(&record), self.cache_ttl)
                    .await?;
                // Hits still pending from an earlier entry are not dropped.
                let baseline = match self.stats.peek(code).await? {
                    Some(pending) => record.clicks.max(pending.clicks),
                    None => record.clicks,
                };
                self.stats.seed(code, baseline, now).await?;

                debug!(code = %code, state = "found_valid", "Resolved from store");
                Ok(Resolution::Redirect(record.original_url))
            }
            StoreLookup::FoundExpired => {
                debug!(code = %code, state = "found_expired", "Short code has expired");
                Ok(Resolution::Gone)
            }
            StoreLookup::NotFound => {
                debug!(code = %code, state = "not_found", "Short code not found");
                Ok(Resolution::NotFound)
            }
        }
    }

    async fn lookup_cache(&self, code: &ShortCode, now: Timestamp) -> Result<CacheLookup> {
        Ok(match self.cache.get_entry(code).await? {
            Some(entry) if entry.is_expired_at(now) => CacheLookup::HitExpired,
            Some(entry) => CacheLookup::HitValid(entry),
            None => CacheLookup::Miss,
        })
    }

    async fn lookup_store(&self, code: &ShortCode, now: Timestamp) -> Result<StoreLookup> {
        Ok(match self.repository.get(code).await? {
            Some(record) if record.is_expired_at(now) => StoreLookup::FoundExpired,
            Some(record) => StoreLookup::FoundValid(record),
            None => StoreLookup::NotFound,
        })
    }

    async fn flush_expired(&self, code: &ShortCode) -> Result<()> {
        if let Some(pending) = self.stats.drain(code).await? {
            self.repository.apply_stats(code, &pending).await?;
            debug!(code = %code, clicks = pending.clicks, "Flushed stats of expired entry");
        }
        Ok(())
    }
}
