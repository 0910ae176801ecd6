use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use snaplink_core::cache::{entry_key, stats_key, Result, ENTRY_KEY_PREFIX};
use snaplink_core::{CacheEntry, CacheError, ExpirationStream, LinkCache, ShortCode, StatsEntry};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Pattern matching the expired-key event channel of every database.
pub const EXPIRED_EVENTS_PATTERN: &str = "__keyevent@*__:expired";

/// Deletes `KEYS[1]` only while it still holds `ARGV[1]`.
const DELETE_IF_EQUAL: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// A Redis-based implementation of [`LinkCache`].
///
/// Entries are stored as JSON strings with a millisecond TTL. Expirations are
/// observed through keyspace notifications, which the server must publish for
/// expired keys (`notify-keyspace-events` containing `Ex`); see
/// [`enable_keyspace_notifications`](Self::enable_keyspace_notifications).
#[derive(Debug, Clone)]
pub struct RedisLinkCache {
    client: redis::Client,
    conn: MultiplexedConnection,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    let message = format!("{operation}: {err}");
    if err.is_timeout() {
        CacheError::Timeout(message)
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        CacheError::Unavailable(message)
    } else {
        CacheError::Operation(message)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PSETEX rejects a zero TTL.
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RedisLinkCache {
    /// Creates a cache from a client and a multiplexed connection opened from it.
    ///
    /// The client is kept to open dedicated pub/sub connections.
    pub fn new(client: redis::Client, conn: MultiplexedConnection) -> Self {
        Self { client, conn }
    }

    /// Opens a client for `url` and connects to it.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| map_redis_error("invalid Redis connection URL", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("failed to connect to Redis", e))?;
        Ok(Self::new(client, conn))
    }

    /// Asks the server to publish expired-key events.
    ///
    /// Managed deployments often forbid `CONFIG`; configure the server instead.
    pub async fn enable_keyspace_notifications(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("failed to enable keyspace notifications", e))?;
        debug!("Enabled Redis expired-key notifications");
        Ok(())
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key).await.map_err(|e| {
            warn!(key, error = %e, "Redis error on get");
            map_redis_error("failed to fetch value from Redis", e)
        })
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
            .await
            .map_err(|e| {
                warn!(key, error = %e, "Redis error on set");
                map_redis_error("failed to write value to Redis", e)
            })
    }

    async fn del_raw(&self, keys: Vec<String>) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys).await.map_err(|e| {
            warn!(error = %e, "Redis error on delete");
            map_redis_error("failed to delete value from Redis", e)
        })
    }
}

#[async_trait]
impl LinkCache for RedisLinkCache {
    async fn get_entry(&self, code: &ShortCode) -> Result<Option<CacheEntry>> {
        let key = entry_key(code);
        trace!(code = %code, "Fetching entry from Redis cache");

        match self.get_raw(&key).await? {
            Some(cached) => {
                debug!(code = %code, "Cache hit in Redis");
                serde_json::from_str::<CacheEntry>(&cached)
                    .map(Some)
                    .map_err(|e| {
                        warn!(code = %code, error = %e, "Failed to deserialize cached entry");
                        CacheError::InvalidData(format!("invalid cached value for key '{key}': {e}"))
                    })
            }
            None => {
                trace!(code = %code, "Cache miss in Redis");
                Ok(None)
            }
        }
    }

    async fn set_entry(&self, code: &ShortCode, entry: &CacheEntry, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(entry).map_err(|e| {
            CacheError::Serialization(format!("failed to serialize cache value: {e}"))
        })?;

        self.set_raw(&entry_key(code), json, ttl).await?;
        debug!(code = %code, "Cached entry in Redis");
        Ok(())
    }

    async fn get_stats(&self, code: &ShortCode) -> Result<Option<StatsEntry>> {
        self.get_raw(&stats_key(code))
            .await?
            .map(|raw| StatsEntry::decode(&raw))
            .transpose()
    }

    async fn set_stats(&self, code: &ShortCode, stats: &StatsEntry, ttl: Duration) -> Result<()> {
        self.set_raw(&stats_key(code), stats.encode()?, ttl).await?;
        trace!(code = %code, clicks = stats.clicks, "Stored stats in Redis");
        Ok(())
    }

    async fn del_stats_if(&self, code: &ShortCode, expected: &StatsEntry) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::Script::new(DELETE_IF_EQUAL)
            .key(stats_key(code))
            .arg(expected.encode()?)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(code = %code, error = %e, "Redis error on conditional delete");
                map_redis_error("failed to delete stats from Redis", e)
            })?;

        trace!(code = %code, removed = removed > 0, "Conditional stats removal in Redis");
        Ok(removed > 0)
    }

    async fn invalidate(&self, code: &ShortCode) -> Result<()> {
        self.del_raw(vec![entry_key(code), stats_key(code)]).await?;
        debug!(code = %code, "Invalidated Redis entry and stats");
        Ok(())
    }

    async fn subscribe_expirations(&self) -> Result<ExpirationStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| map_redis_error("failed to open Redis pub/sub connection", e))?;
        pubsub
            .psubscribe(EXPIRED_EVENTS_PATTERN)
            .await
            .map_err(|e| map_redis_error("failed to subscribe to expired-key events", e))?;
        debug!(pattern = EXPIRED_EVENTS_PATTERN, "Subscribed to Redis expirations");

        let (keys_tx, keys_rx) = mpsc::channel(1024);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let feeder = tokio::spawn(async move {
            {
                let mut messages = pubsub.on_message();
                loop {
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        message = messages.next() => {
                            let Some(message) = message else {
                                warn!("Redis pub/sub connection closed");
                                break;
                            };
                            let key: String = match message.get_payload() {
                                Ok(key) => key,
                                Err(e) => {
                                    warn!(error = %e, "Ignoring malformed expiration event");
                                    continue;
                                }
                            };
                            if !key.starts_with(ENTRY_KEY_PREFIX) {
                                continue;
                            }
                            trace!(key = %key, "Resolution entry expired in Redis");
                            if keys_tx.send(key).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            match pubsub.punsubscribe(EXPIRED_EVENTS_PATTERN).await {
                Ok(()) => debug!("Unsubscribed from Redis expirations"),
                Err(e) => warn!(error = %e, "Failed to unsubscribe from Redis expirations"),
            }
        });

        Ok(ExpirationStream::new(keys_rx, stop_tx, feeder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(30)), 30_000);
    }
}
