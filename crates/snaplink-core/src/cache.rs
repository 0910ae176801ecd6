use crate::error::CacheError;
use crate::expiration::ExpirationStream;
use crate::link::LinkRecord;
use crate::shortcode::ShortCode;
use crate::stats::StatsEntry;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Key prefix of resolution entries. Expiration events are filtered on it.
pub const ENTRY_KEY_PREFIX: &str = "short_url:";
/// Key prefix of the stats entry paired with each resolution entry.
pub const STATS_KEY_PREFIX: &str = "stats:";

/// Cache key holding the [`CacheEntry`] for `code`.
pub fn entry_key(code: &ShortCode) -> String {
    format!("{ENTRY_KEY_PREFIX}{}", code.as_str())
}

/// Cache key holding the [`StatsEntry`] for `code`.
pub fn stats_key(code: &ShortCode) -> String {
    format!("{STATS_KEY_PREFIX}{}", code.as_str())
}

/// Recovers the short code from a resolution entry key.
///
/// Returns `None` for keys outside the entry keyspace or with an invalid code.
pub fn code_from_entry_key(key: &str) -> Option<ShortCode> {
    key.strip_prefix(ENTRY_KEY_PREFIX)
        .and_then(|code| ShortCode::new(code).ok())
}

/// What the resolution path needs to redirect without touching the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub original_url: String,
    pub expires_at: Option<Timestamp>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

impl From<&LinkRecord> for CacheEntry {
    fn from(record: &LinkRecord) -> Self {
        Self {
            original_url: record.original_url.clone(),
            expires_at: record.expires_at,
        }
    }
}

/// The ephemeral cache shared by the resolution path and the write-back pipeline.
///
/// Implementations must store entries under [`entry_key`] and stats under
/// [`stats_key`] so that every process agrees on the layout.
#[async_trait]
pub trait LinkCache: Send + Sync + 'static {
    /// Get the resolution entry for `code`.
    ///
    /// Returns `Ok(None)` if the key is not in the cache.
    async fn get_entry(&self, code: &ShortCode) -> Result<Option<CacheEntry>>;

    /// Store the resolution entry for `code`, expiring after `ttl`.
    async fn set_entry(&self, code: &ShortCode, entry: &CacheEntry, ttl: Duration) -> Result<()>;

    /// Get the pending stats for `code`.
    async fn get_stats(&self, code: &ShortCode) -> Result<Option<StatsEntry>>;

    /// Overwrite the pending stats for `code`, expiring after `ttl`.
    async fn set_stats(&self, code: &ShortCode, stats: &StatsEntry, ttl: Duration) -> Result<()>;

    /// Remove the pending stats for `code` if they still equal `expected`.
    ///
    /// Returns `false` when the key is absent or holds newer stats, which then
    /// stay in place. The comparison and the removal are atomic.
    async fn del_stats_if(&self, code: &ShortCode, expected: &StatsEntry) -> Result<bool>;

    /// Remove both the resolution entry and the stats for `code`.
    ///
    /// It is not an error if either key does not exist.
    async fn invalidate(&self, code: &ShortCode) -> Result<()>;

    /// Subscribe to expirations of resolution entries.
    ///
    /// The stream yields full keys starting with [`ENTRY_KEY_PREFIX`].
    async fn subscribe_expirations(&self) -> Result<ExpirationStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;

    #[test]
    fn key_layout() {
        let code = ShortCode::new("abc123").unwrap();
        assert_eq!(entry_key(&code), "short_url:abc123");
        assert_eq!(stats_key(&code), "stats:abc123");
    }

    #[test]
    fn code_from_entry_key_only_accepts_entry_keys() {
        assert_eq!(
            code_from_entry_key("short_url:abc123"),
            Some(ShortCode::new_unchecked("abc123"))
        );
        assert_eq!(code_from_entry_key("stats:abc123"), None);
        assert_eq!(code_from_entry_key("short_url:a b"), None);
        assert_eq!(code_from_entry_key("short_url:"), None);
    }

    #[test]
    fn entry_expiry() {
        let now = Timestamp::now();
        let entry = CacheEntry {
            original_url: "https://example.com".to_string(),
            expires_at: Some(now - SignedDuration::from_secs(1)),
        };
        assert!(entry.is_expired_at(now));

        let entry = CacheEntry {
            expires_at: None,
            ..entry
        };
        assert!(!entry.is_expired_at(now));
    }
}
