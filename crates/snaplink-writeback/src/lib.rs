//! Expiration-driven write-back of cache-held stats.
//!
//! When a resolution entry expires, the stats accumulated next to it are
//! applied to the store as absolute values and removed from the cache.
//! Applying the same stats twice is harmless, so several pipelines may run
//! against one cache.

use snaplink_core::cache::code_from_entry_key;
use snaplink_core::{CacheError, ExpirationStream, LinkCache, Repository, ShortCode, StatsEntry};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// What a single reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Pending stats were written to the store and, unless a redirect counted
    /// on top of them meanwhile, removed from the cache.
    Applied(StatsEntry),
    /// No stats were pending for the code.
    NothingPending,
    /// Stats were pending but the link no longer exists; they were dropped.
    Discarded,
    /// A backend failed; the stats stay in the cache until their TTL.
    Failed,
}

pub struct WritebackPipeline<R: ?Sized, C: ?Sized> {
    repository: Arc<R>,
    cache: Arc<C>,
}

impl<R, C> WritebackPipeline<R, C>
where
    R: Repository + ?Sized,
    C: LinkCache + ?Sized,
{
    pub fn new(repository: Arc<R>, cache: Arc<C>) -> Self {
        Self { repository, cache }
    }

    /// Moves the pending stats of `code` from the cache into the store.
    ///
    /// Failures are logged and reported, never retried.
    pub async fn reconcile(&self, code: &ShortCode) -> Reconciliation {
        let pending = match self.cache.get_stats(code).await {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                trace!(code = %code, "No pending stats");
                return Reconciliation::NothingPending;
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Failed to read pending stats");
                return Reconciliation::Failed;
            }
        };

        let outcome = match self.repository.apply_stats(code, &pending).await {
            Ok(true) => {
                debug!(code = %code, clicks = pending.clicks, "Wrote back stats");
                Reconciliation::Applied(pending)
            }
            Ok(false) => {
                debug!(code = %code, "Link is gone; dropping its stats");
                Reconciliation::Discarded
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Failed to write back stats");
                return Reconciliation::Failed;
            }
        };

        // A redirect may have counted on top of `pending` in the meantime; its
        // stats include everything written here and must stay.
        match self.cache.del_stats_if(code, &pending).await {
            Ok(true) => {}
            Ok(false) => trace!(code = %code, "Stats moved on during write-back; kept"),
            // Harmless: replaying the same absolute values changes nothing.
            Err(e) => warn!(code = %code, error = %e, "Failed to remove written-back stats"),
        }
        outcome
    }

    /// Reconciles the code named by an expired entry key.
    async fn on_expired(&self, key: &str) {
        match code_from_entry_key(key) {
            Some(code) => {
                self.reconcile(&code).await;
            }
            None => warn!(key, "Ignoring expiration of unrecognised key"),
        }
    }

    async fn run(self, mut events: ExpirationStream, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                key = events.next() => match key {
                    Some(key) => self.on_expired(&key).await,
                    None => {
                        error!("Expiration stream ended; write-back stopped");
                        break;
                    }
                },
            }
        }

        events.close().await;
        info!("Write-back pipeline stopped");
    }

    /// Subscribes to expirations and processes them on a dedicated task.
    ///
    /// The subscription is in place when this returns, so no expiration that
    /// happens afterwards is missed.
    pub async fn spawn(self) -> Result<WritebackHandle, CacheError> {
        let events = self.cache.subscribe_expirations().await?;
        let (shutdown, signal) = watch::channel(false);

        let join = tokio::spawn(self.run(events, signal));
        info!("Write-back pipeline started");

        Ok(WritebackHandle { shutdown, join })
    }
}

/// Controls a spawned [`WritebackPipeline`].
///
/// Dropping the handle also stops the pipeline, without waiting for it.
#[derive(Debug)]
pub struct WritebackHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WritebackHandle {
    /// Whether the pipeline task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops the pipeline after the in-flight reconciliation and waits until
    /// it has unsubscribed from the cache.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "Write-back pipeline task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use jiff::Timestamp;
    use snaplink_cache::MokaLinkCache;
    use snaplink_core::repository::Result as StorageResult;
    use snaplink_core::{CacheEntry, LinkRecord, NewLink, OwnerId, ReadRepository, StorageError};
    use snaplink_resolver::{Resolution, ResolutionEngine, ResolverSettings};
    use snaplink_storage::InMemoryRepository;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn fast_cache() -> Arc<MokaLinkCache> {
        Arc::new(MokaLinkCache::from(
            MokaLinkCache::builder()
                .housekeeping_interval(Duration::from_millis(20))
                .build(),
        ))
    }

    fn engine(
        repo: Arc<InMemoryRepository>,
        cache: Arc<MokaLinkCache>,
        cache_ttl: Duration,
    ) -> ResolutionEngine<InMemoryRepository, MokaLinkCache> {
        let settings = ResolverSettings::builder()
            .cache_ttl(cache_ttl)
            .stats_ttl(Duration::from_secs(60))
            .build();
        ResolutionEngine::new(repo, cache, settings)
    }

    async fn insert(repo: &InMemoryRepository, c: &str) {
        repo.insert(NewLink {
            short_code: code(c),
            original_url: "https://example.com".to_string(),
            owner: None,
            expires_at: None,
        })
        .await
        .unwrap();
    }

    async fn stored_clicks(repo: &InMemoryRepository, c: &str) -> u64 {
        repo.get(&code(c)).await.unwrap().unwrap().clicks
    }

    async fn pending(cache: &MokaLinkCache, c: &str, clicks: u64) {
        cache
            .set_stats(
                &code(c),
                &StatsEntry::seeded(clicks - 1, Timestamp::now()),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
    }

    /// Waits until the stored clicks of `c` satisfy `done`.
    async fn wait_for_clicks(repo: &InMemoryRepository, c: &str, done: impl Fn(u64) -> bool) {
        awaitility::at_most(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(20))
            .until_async(|| async { done(stored_clicks(repo, c).await) })
            .await;
    }

    /// Delegates to an in-memory store, failing stats writes for `broken` and
    /// serving one redirect through `racer` in the middle of a stats write.
    struct InterceptingRepository {
        inner: Arc<InMemoryRepository>,
        broken: Option<ShortCode>,
        racer: Option<ResolutionEngine<InMemoryRepository, MokaLinkCache>>,
        raced: AtomicBool,
    }

    impl InterceptingRepository {
        fn new(inner: Arc<InMemoryRepository>) -> Self {
            Self {
                inner,
                broken: None,
                racer: None,
                raced: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ReadRepository for InterceptingRepository {
        async fn get(&self, code: &ShortCode) -> StorageResult<Option<LinkRecord>> {
            self.inner.get(code).await
        }

        async fn search_by_url(&self, url: &str, now: Timestamp) -> StorageResult<Vec<LinkRecord>> {
            self.inner.search_by_url(url, now).await
        }

        async fn list_by_owner(&self, owner: &OwnerId, now: Timestamp) -> StorageResult<Vec<LinkRecord>> {
            self.inner.list_by_owner(owner, now).await
        }

        async fn find_unused(&self, owner: &OwnerId, cutoff: Timestamp) -> StorageResult<Vec<LinkRecord>> {
            self.inner.find_unused(owner, cutoff).await
        }
    }

    #[async_trait]
    impl Repository for InterceptingRepository {
        async fn insert(&self, link: NewLink) -> StorageResult<LinkRecord> {
            self.inner.insert(link).await
        }

        async fn update_target(
            &self,
            code: &ShortCode,
            original_url: &str,
            now: Timestamp,
        ) -> StorageResult<Option<LinkRecord>> {
            self.inner.update_target(code, original_url, now).await
        }

        async fn delete(&self, code: &ShortCode) -> StorageResult<bool> {
            self.inner.delete(code).await
        }

        async fn apply_stats(&self, code: &ShortCode, stats: &StatsEntry) -> StorageResult<bool> {
            if self.broken.as_ref() == Some(code) {
                return Err(StorageError::Unavailable("simulated outage".to_string()));
            }
            if let Some(racer) = &self.racer {
                if !self.raced.swap(true, Ordering::SeqCst) {
                    let resolution = racer.resolve(code).await;
                    assert!(matches!(resolution, Ok(Resolution::Redirect(_))));
                }
            }
            self.inner.apply_stats(code, stats).await
        }
    }

    #[tokio::test]
    async fn reconcile_applies_and_removes_stats() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(MokaLinkCache::new());
        insert(&repo, "abc123").await;
        pending(&cache, "abc123", 4).await;
        let pipeline = WritebackPipeline::new(repo.clone(), cache.clone());

        let outcome = pipeline.reconcile(&code("abc123")).await;

        assert!(matches!(outcome, Reconciliation::Applied(stats) if stats.clicks == 4));
        assert_eq!(stored_clicks(&repo, "abc123").await, 4);
        assert!(cache.get_stats(&code("abc123")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reconcile_without_stats_is_a_no_op() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(MokaLinkCache::new());
        insert(&repo, "abc123").await;
        let pipeline = WritebackPipeline::new(repo.clone(), cache);

        assert_eq!(
            pipeline.reconcile(&code("abc123")).await,
            Reconciliation::NothingPending
        );
        let stored = repo.get(&code("abc123")).await.unwrap().unwrap();
        assert_eq!(stored.clicks, 0);
        assert_eq!(stored.last_used, None);
    }

    #[tokio::test]
    async fn reconcile_never_lowers_stored_clicks() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(MokaLinkCache::new());
        insert(&repo, "abc123").await;
        repo.apply_stats(&code("abc123"), &StatsEntry::seeded(9, Timestamp::now()))
            .await
            .unwrap();
        // Stats restarted from 1 after the cache lost the earlier count.
        pending(&cache, "abc123", 1).await;
        let pipeline = WritebackPipeline::new(repo.clone(), cache);

        pipeline.reconcile(&code("abc123")).await;

        assert_eq!(stored_clicks(&repo, "abc123").await, 10);
    }

    #[tokio::test]
    async fn stats_of_deleted_links_are_discarded() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(MokaLinkCache::new());
        pending(&cache, "gone01", 2).await;
        let pipeline = WritebackPipeline::new(repo, cache.clone());

        assert_eq!(
            pipeline.reconcile(&code("gone01")).await,
            Reconciliation::Discarded
        );
        assert!(cache.get_stats(&code("gone01")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn redirect_during_write_back_keeps_counting() {
        let inner = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(MokaLinkCache::new());
        insert(&inner, "busy01").await;
        let baseline = 10;
        inner
            .apply_stats(&code("busy01"), &StatsEntry::seeded(baseline - 1, Timestamp::now()))
            .await
            .unwrap();

        let resolver = engine(inner.clone(), cache.clone(), Duration::from_secs(60));
        let repo = Arc::new(InterceptingRepository {
            racer: Some(engine(inner.clone(), cache.clone(), Duration::from_secs(60))),
            ..InterceptingRepository::new(inner.clone())
        });
        let pipeline = WritebackPipeline::new(repo, cache.clone());

        for _ in 0..4 {
            resolver.resolve(&code("busy01")).await.unwrap();
        }
        // One more redirect lands while these four are being written.
        let first = pipeline.reconcile(&code("busy01")).await;
        assert!(matches!(first, Reconciliation::Applied(stats) if stats.clicks == baseline + 4));
        assert_eq!(
            cache.get_stats(&code("busy01")).await.unwrap().map(|s| s.clicks),
            Some(baseline + 5)
        );

        for _ in 0..5 {
            resolver.resolve(&code("busy01")).await.unwrap();
        }
        let second = pipeline.reconcile(&code("busy01")).await;

        assert!(matches!(second, Reconciliation::Applied(stats) if stats.clicks == baseline + 10));
        assert_eq!(stored_clicks(&inner, "busy01").await, baseline + 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_failures_keep_stats_and_do_not_block_other_codes() {
        let inner = Arc::new(InMemoryRepository::new());
        let repo = Arc::new(InterceptingRepository {
            broken: Some(code("broken")),
            ..InterceptingRepository::new(inner.clone())
        });
        let cache = fast_cache();
        insert(&inner, "broken").await;
        insert(&inner, "fine01").await;
        pending(&cache, "broken", 3).await;
        pending(&cache, "fine01", 3).await;
        let pipeline = WritebackPipeline::new(repo, cache.clone());

        assert_eq!(pipeline.reconcile(&code("broken")).await, Reconciliation::Failed);
        assert!(cache.get_stats(&code("broken")).await.unwrap().is_some());

        // The spawned pipeline keeps going after a failed event.
        let handle = pipeline.spawn().await.unwrap();
        for c in ["broken", "fine01"] {
            cache
                .set_entry(
                    &code(c),
                    &CacheEntry {
                        original_url: "https://example.com".to_string(),
                        expires_at: None,
                    },
                    Duration::from_millis(30),
                )
                .await
                .unwrap();
        }

        wait_for_clicks(&inner, "fine01", |clicks| clicks == 3).await;
        assert_eq!(stored_clicks(&inner, "broken").await, 0);
        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_resolutions_reach_the_store() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = fast_cache();
        insert(&repo, "busy01").await;
        let baseline = 5;
        repo.apply_stats(&code("busy01"), &StatsEntry::seeded(baseline - 1, Timestamp::now()))
            .await
            .unwrap();

        let handle = WritebackPipeline::new(repo.clone(), cache.clone())
            .spawn()
            .await
            .unwrap();
        let engine = Arc::new(engine(repo.clone(), cache.clone(), Duration::from_millis(50)));

        let resolutions = 20;
        let mut tasks = Vec::new();
        for _ in 0..resolutions {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine.resolve(&code("busy01")).await
            }));
        }
        for task in tasks {
            assert!(matches!(task.await.unwrap().unwrap(), Resolution::Redirect(_)));
        }

        wait_for_clicks(&repo, "busy01", |clicks| clicks > baseline).await;
        handle.shutdown().await;

        let stored = repo.get(&code("busy01")).await.unwrap().unwrap();
        assert!(stored.clicks >= baseline + 1);
        assert!(stored.clicks <= baseline + resolutions);
        assert!(stored.last_used.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn hot_link_is_written_back_on_every_expiration() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = fast_cache();
        insert(&repo, "hot001").await;
        let handle = WritebackPipeline::new(repo.clone(), cache.clone())
            .spawn()
            .await
            .unwrap();
        let engine = engine(repo.clone(), cache.clone(), Duration::from_millis(40));

        // Steady traffic keeps re-seeding the entry right after it expires.
        for _ in 0..30 {
            engine.resolve(&code("hot001")).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        wait_for_clicks(&repo, "hot001", |clicks| clicks >= 20).await;
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = fast_cache();
        let handle = WritebackPipeline::new(repo, cache).spawn().await.unwrap();

        assert!(!handle.is_finished());
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("pipeline did not stop");
    }
}
