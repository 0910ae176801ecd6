use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jiff::Timestamp;
use snaplink_core::repository::{ReadRepository, Repository, Result};
use snaplink_core::{LinkRecord, NewLink, OwnerId, ShortCode, StatsEntry, StorageError};
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory implementation of the repository traits using DashMap.
///
/// DashMap provides better concurrency than RwLock<HashMap> because it
/// uses sharded locks, allowing concurrent reads and writes to different
/// buckets without blocking. Inserts go through the entry API so that two
/// concurrent inserts of the same code cannot both succeed.
#[derive(Debug)]
pub struct InMemoryRepository {
    storage: DashMap<String, LinkRecord>,
    next_id: AtomicU64,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self {
            storage: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn collect<F>(&self, predicate: F) -> Vec<LinkRecord>
    where
        F: Fn(&LinkRecord) -> bool,
    {
        let mut records: Vec<LinkRecord> = self
            .storage
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.id);
        records
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<LinkRecord>> {
        Ok(self.storage.get(code.as_str()).map(|entry| entry.value().clone()))
    }

    async fn search_by_url(&self, original_url: &str, now: Timestamp) -> Result<Vec<LinkRecord>> {
        Ok(self.collect(|record| record.original_url == original_url && !record.is_expired_at(now)))
    }

    async fn list_by_owner(&self, owner: &OwnerId, now: Timestamp) -> Result<Vec<LinkRecord>> {
        Ok(self.collect(|record| record.owner.as_ref() == Some(owner) && !record.is_expired_at(now)))
    }

    async fn find_unused(&self, owner: &OwnerId, cutoff: Timestamp) -> Result<Vec<LinkRecord>> {
        Ok(self.collect(|record| {
            record.owner.as_ref() == Some(owner)
                && record.created_at < cutoff
                && record.last_used.map_or(true, |used| used < cutoff)
        }))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert(&self, link: NewLink) -> Result<LinkRecord> {
        match self.storage.entry(link.short_code.as_str().to_owned()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(link.short_code.to_string())),
            Entry::Vacant(slot) => {
                let now = Timestamp::now();
                let record = LinkRecord {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    short_code: link.short_code,
                    original_url: link.original_url,
                    owner: link.owner,
                    created_at: now,
                    updated_at: now,
                    expires_at: link.expires_at,
                    clicks: 0,
                    last_used: None,
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn update_target(
        &self,
        code: &ShortCode,
        original_url: &str,
        now: Timestamp,
    ) -> Result<Option<LinkRecord>> {
        let Some(mut entry) = self.storage.get_mut(code.as_str()) else {
            return Ok(None);
        };

        entry.original_url = original_url.to_owned();
        entry.updated_at = now;
        entry.clicks = 0;
        entry.last_used = None;
        Ok(Some(entry.value().clone()))
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        Ok(self.storage.remove(code.as_str()).is_some())
    }

    async fn apply_stats(&self, code: &ShortCode, stats: &StatsEntry) -> Result<bool> {
        let Some(mut entry) = self.storage.get_mut(code.as_str()) else {
            return Ok(false);
        };

        stats.merge_into(entry.value_mut());
        Ok(true)
    }
}
