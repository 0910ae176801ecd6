use async_trait::async_trait;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use moka::Expiry;
use snaplink_core::cache::{entry_key, stats_key, Result, ENTRY_KEY_PREFIX};
use snaplink_core::{CacheEntry, CacheError, ExpirationStream, LinkCache, ShortCode, StatsEntry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone)]
enum Cached {
    Entry(CacheEntry),
    Stats(StatsEntry),
}

/// A cached value together with the TTL it was written with.
#[derive(Debug, Clone)]
struct Slot {
    value: Cached,
    ttl: Duration,
    written_at: Instant,
}

impl Slot {
    fn new(value: Cached, ttl: Duration) -> Self {
        Self {
            value,
            ttl,
            written_at: Instant::now(),
        }
    }

    /// Whether the TTL ran out, even if Moka has not evicted the slot yet.
    fn has_expired(&self) -> bool {
        self.written_at.elapsed() >= self.ttl
    }
}

/// Whether a removal ends the life of a slot by expiry or capacity.
///
/// Moka only evicts expired slots during maintenance. A slot overwritten
/// after its TTL ran out but before that is reported as `Replaced`.
fn is_expiry(cause: RemovalCause, slot: &Slot) -> bool {
    match cause {
        RemovalCause::Expired | RemovalCause::Size => true,
        RemovalCause::Replaced => slot.has_expired(),
        _ => false,
    }
}

/// Gives every slot the TTL it was written with, restarting it on overwrite.
struct SlotExpiry;

impl Expiry<String, Slot> for SlotExpiry {
    fn expire_after_create(&self, _key: &String, value: &Slot, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Slot,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Configuration for a [`MokaLinkCache`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct MokaCacheConfig {
    /// Maximum number of keys, entries and stats counted together.
    #[builder(default = 100_000)]
    max_capacity: u64,
    /// How often a subscribed feeder drives Moka's pending maintenance.
    ///
    /// Moka only evicts expired keys while it runs maintenance, so this bounds
    /// how late an expiration event can be observed.
    #[builder(default = Duration::from_secs(1))]
    housekeeping_interval: Duration,
    /// Buffer of expired keys between the eviction listener and subscribers.
    #[builder(default = 1024)]
    event_capacity: usize,
}

impl Default for MokaCacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// An in-process [`LinkCache`] backed by Moka.
///
/// Suitable for single-node deployments and tests. Expiration events come from
/// Moka's eviction listener: resolution entries removed because their TTL ran
/// out (or because the cache was full) are published to every subscriber. So
/// are entries overwritten after their TTL ran out.
#[derive(Clone)]
pub struct MokaLinkCache {
    cache: Cache<String, Slot>,
    events: broadcast::Sender<String>,
    housekeeping_interval: Duration,
    event_capacity: usize,
}

impl std::fmt::Debug for MokaLinkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaLinkCache")
            .field("entry_count", &self.cache.entry_count())
            .field("housekeeping_interval", &self.housekeeping_interval)
            .finish()
    }
}

impl MokaLinkCache {
    /// Creates a cache with default settings.
    pub fn new() -> Self {
        Self::from(MokaCacheConfig::default())
    }

    /// Returns a builder for a custom cache configuration.
    pub fn builder() -> MokaCacheConfigBuilder {
        MokaCacheConfig::builder()
    }

    /// Runs Moka's pending maintenance, firing eviction events for expired keys.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    async fn put(&self, key: String, value: Cached, ttl: Duration) {
        self.cache.insert(key, Slot::new(value, ttl)).await;
    }
}

impl Default for MokaLinkCache {
    fn default() -> Self {
        Self::new()
    }
}

impl From<MokaCacheConfig> for MokaLinkCache {
    fn from(config: MokaCacheConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let publisher = events.clone();

        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(SlotExpiry)
            .eviction_listener(move |key: Arc<String>, slot: Slot, cause: RemovalCause| {
                if !is_expiry(cause, &slot) {
                    return;
                }
                if key.starts_with(ENTRY_KEY_PREFIX) {
                    trace!(key = %key, ?cause, "Resolution entry evicted from Moka");
                    // No receivers simply means nobody is subscribed yet.
                    let _ = publisher.send(key.as_ref().clone());
                }
            })
            .build();

        Self {
            cache,
            events,
            housekeeping_interval: config.housekeeping_interval,
            event_capacity: config.event_capacity,
        }
    }
}

#[async_trait]
impl LinkCache for MokaLinkCache {
    async fn get_entry(&self, code: &ShortCode) -> Result<Option<CacheEntry>> {
        match self.cache.get(&entry_key(code)).await {
            Some(Slot {
                value: Cached::Entry(entry),
                ..
            }) => {
                trace!(code = %code, "Entry hit in Moka");
                Ok(Some(entry))
            }
            Some(_) => Err(CacheError::InvalidData(format!(
                "unexpected value under entry key for '{code}'"
            ))),
            None => {
                trace!(code = %code, "Entry miss in Moka");
                Ok(None)
            }
        }
    }

    async fn set_entry(&self, code: &ShortCode, entry: &CacheEntry, ttl: Duration) -> Result<()> {
        self.put(entry_key(code), Cached::Entry(entry.clone()), ttl)
            .await;
        debug!(code = %code, ttl_ms = ttl.as_millis() as u64, "Cached entry in Moka");
        Ok(())
    }

    async fn get_stats(&self, code: &ShortCode) -> Result<Option<StatsEntry>> {
        match self.cache.get(&stats_key(code)).await {
            Some(Slot {
                value: Cached::Stats(stats),
                ..
            }) => Ok(Some(stats)),
            Some(_) => Err(CacheError::InvalidData(format!(
                "unexpected value under stats key for '{code}'"
            ))),
            None => Ok(None),
        }
    }

    async fn set_stats(&self, code: &ShortCode, stats: &StatsEntry, ttl: Duration) -> Result<()> {
        self.put(stats_key(code), Cached::Stats(*stats), ttl).await;
        trace!(code = %code, clicks = stats.clicks, "Stored stats in Moka");
        Ok(())
    }

    async fn del_stats_if(&self, code: &ShortCode, expected: &StatsEntry) -> Result<bool> {
        let expected = *expected;
        let result = self
            .cache
            .entry(stats_key(code))
            .and_compute_with(|current| async move {
                match current.map(|entry| entry.into_value()) {
                    Some(Slot {
                        value: Cached::Stats(stats),
                        ..
                    }) if stats == expected => Op::Remove,
                    _ => Op::Nop,
                }
            })
            .await;

        let removed = matches!(result, CompResult::Removed(_));
        trace!(code = %code, removed, "Conditional stats removal in Moka");
        Ok(removed)
    }

    async fn invalidate(&self, code: &ShortCode) -> Result<()> {
        self.cache.invalidate(&entry_key(code)).await;
        self.cache.invalidate(&stats_key(code)).await;
        debug!(code = %code, "Invalidated Moka entry and stats (if present)");
        Ok(())
    }

    async fn subscribe_expirations(&self) -> Result<ExpirationStream> {
        let mut events = self.events.subscribe();
        let (keys_tx, keys_rx) = mpsc::channel(self.event_capacity);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let cache = self.cache.clone();
        let period = self.housekeeping_interval;

        let feeder = tokio::spawn(async move {
            let mut housekeeping = tokio::time::interval(period);
            housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = housekeeping.tick() => cache.run_pending_tasks().await,
                    event = events.recv() => match event {
                        Ok(key) => {
                            if keys_tx.send(key).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Expiration subscriber lagged; events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Moka expiration feeder unsubscribed");
        });

        debug!(interval_ms = period.as_millis() as u64, "Subscribed to Moka expirations");
        Ok(ExpirationStream::new(keys_rx, stop_tx, feeder))
    }
}
