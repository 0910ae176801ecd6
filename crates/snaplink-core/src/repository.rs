use crate::error::StorageError;
use crate::link::{LinkRecord, NewLink, OwnerId};
use crate::shortcode::ShortCode;
use crate::stats::StatsEntry;
use async_trait::async_trait;
use jiff::Timestamp;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A read-only view of the durable link store.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the link stored under `code`, expired or not.
    /// Returns `None` if the code does not exist.
    async fn get(&self, code: &ShortCode) -> Result<Option<LinkRecord>>;

    /// Links pointing at exactly `original_url` that have not expired at `now`.
    async fn search_by_url(&self, original_url: &str, now: Timestamp) -> Result<Vec<LinkRecord>>;

    /// Links owned by `owner` that have not expired at `now`.
    async fn list_by_owner(&self, owner: &OwnerId, now: Timestamp) -> Result<Vec<LinkRecord>>;

    /// Links owned by `owner` created before `cutoff` and not used since.
    async fn find_unused(&self, owner: &OwnerId, cutoff: Timestamp) -> Result<Vec<LinkRecord>>;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a new link, failing atomically with `Err(Conflict)` if the code is taken.
    async fn insert(&self, link: NewLink) -> Result<LinkRecord>;

    /// Points `code` at a new target and resets its usage statistics.
    /// Returns the updated record, or `None` if the code does not exist.
    async fn update_target(
        &self,
        code: &ShortCode,
        original_url: &str,
        now: Timestamp,
    ) -> Result<Option<LinkRecord>>;

    /// Deletes the link stored under `code`.
    /// Returns `true` if the record existed and was removed.
    async fn delete(&self, code: &ShortCode) -> Result<bool>;

    /// Applies cache-held stats as absolute values.
    ///
    /// Neither `clicks` nor `last_used` is ever moved backwards, so replaying the
    /// same stats is harmless. Returns `false` if the code does not exist.
    async fn apply_stats(&self, code: &ShortCode, stats: &StatsEntry) -> Result<bool>;
}
