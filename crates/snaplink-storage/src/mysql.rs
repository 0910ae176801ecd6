use async_trait::async_trait;
use jiff::Timestamp;
use snaplink_core::repository::{ReadRepository, Repository, Result};
use snaplink_core::{LinkRecord, NewLink, OwnerId, ShortCode, StatsEntry, StorageError};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

const SELECT_COLUMNS: &str = "SELECT id, short_code, original_url, owner_id, created_at, \
     updated_at, expires_at, clicks, last_used FROM links";

/// MySQL implementation of the repository contract.
///
/// Timestamps are stored as Unix seconds. Uniqueness of short codes is
/// enforced by the `uk_links_short_code` index, so inserts never need a
/// separate existence check. Expired rows stay in the table until an external
/// sweep removes them and keep their code reserved until then.
#[derive(Debug, Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    /// Creates a repository from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `links` table and its indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(crate::MYSQL_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        let exists = sqlx::query("SELECT 1 FROM links WHERE short_code = ? LIMIT 1")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .is_some();

        Ok(exists)
    }
}

/// The current time at the precision the table stores.
fn now_seconds() -> Result<Timestamp> {
    parse_timestamp("now", Timestamp::now().as_second())
}

fn parse_timestamp(column: &str, seconds: i64) -> Result<Timestamp> {
    Timestamp::from_second(seconds).map_err(|e| {
        StorageError::InvalidData(format!("invalid {column} timestamp '{seconds}': {e}"))
    })
}

/// An expiry at the precision the table stores, rounded up so that a link
/// never expires earlier than asked.
fn expiry_seconds(expires_at: Timestamp) -> i64 {
    expires_at.as_second() + i64::from(expires_at.subsec_nanosecond() > 0)
}

fn parse_optional_timestamp(column: &str, seconds: Option<i64>) -> Result<Option<Timestamp>> {
    seconds
        .map(|value| parse_timestamp(column, value))
        .transpose()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn row_to_record(row: &MySqlRow) -> Result<LinkRecord> {
    let short_code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    let short_code = ShortCode::new(short_code)
        .map_err(|e| StorageError::InvalidData(format!("stored short code is invalid: {e}")))?;

    let owner = row
        .try_get::<Option<String>, _>("owner_id")
        .map_err(map_sqlx_error)?
        .map(|raw| {
            raw.parse::<OwnerId>()
                .map_err(|e| StorageError::InvalidData(e.to_string()))
        })
        .transpose()?;

    Ok(LinkRecord {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        short_code,
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        owner,
        created_at: parse_timestamp(
            "created_at",
            row.try_get("created_at").map_err(map_sqlx_error)?,
        )?,
        updated_at: parse_timestamp(
            "updated_at",
            row.try_get("updated_at").map_err(map_sqlx_error)?,
        )?,
        expires_at: parse_optional_timestamp(
            "expires_at",
            row.try_get("expires_at").map_err(map_sqlx_error)?,
        )?,
        clicks: row.try_get("clicks").map_err(map_sqlx_error)?,
        last_used: parse_optional_timestamp(
            "last_used",
            row.try_get("last_used").map_err(map_sqlx_error)?,
        )?,
    })
}

fn rows_to_records(rows: Vec<MySqlRow>) -> Result<Vec<LinkRecord>> {
    rows.iter().map(row_to_record).collect()
}

#[async_trait]
impl ReadRepository for MySqlRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<LinkRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE short_code = ? LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn search_by_url(&self, original_url: &str, now: Timestamp) -> Result<Vec<LinkRecord>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE original_url = ? \
             AND (expires_at IS NULL OR expires_at > ?) ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(original_url)
            .bind(now.as_second())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows_to_records(rows)
    }

    async fn list_by_owner(&self, owner: &OwnerId, now: Timestamp) -> Result<Vec<LinkRecord>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE owner_id = ? \
             AND (expires_at IS NULL OR expires_at > ?) ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(owner.to_string())
            .bind(now.as_second())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows_to_records(rows)
    }

    async fn find_unused(&self, owner: &OwnerId, cutoff: Timestamp) -> Result<Vec<LinkRecord>> {
        let cutoff = cutoff.as_second();
        let sql = format!(
            "{SELECT_COLUMNS} WHERE owner_id = ? AND created_at < ? \
             AND (last_used IS NULL OR last_used < ?) ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(owner.to_string())
            .bind(cutoff)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows_to_records(rows)
    }
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn insert(&self, link: NewLink) -> Result<LinkRecord> {
        let now = now_seconds()?;
        let expires_at = link.expires_at.map(expiry_seconds);

        let result = sqlx::query(
            r#"
            INSERT INTO links (short_code, original_url, owner_id, created_at, updated_at, expires_at, clicks, last_used)
            VALUES (?, ?, ?, ?, ?, ?, 0, NULL)
            "#,
        )
        .bind(link.short_code.as_str())
        .bind(link.original_url.as_str())
        .bind(link.owner.map(|owner| owner.to_string()))
        .bind(now.as_second())
        .bind(now.as_second())
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(LinkRecord {
                id: done.last_insert_id(),
                short_code: link.short_code,
                original_url: link.original_url,
                owner: link.owner,
                created_at: now,
                updated_at: now,
                expires_at: parse_optional_timestamp("expires_at", expires_at)?,
                clicks: 0,
                last_used: None,
            }),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(link.short_code.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn update_target(
        &self,
        code: &ShortCode,
        original_url: &str,
        now: Timestamp,
    ) -> Result<Option<LinkRecord>> {
        sqlx::query(
            r#"
            UPDATE links
            SET original_url = ?, updated_at = ?, clicks = 0, last_used = NULL
            WHERE short_code = ?
            "#,
        )
        .bind(original_url)
        .bind(now.as_second())
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.get(code).await
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        let result = sqlx::query("DELETE FROM links WHERE short_code = ?")
            .bind(code.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn apply_stats(&self, code: &ShortCode, stats: &StatsEntry) -> Result<bool> {
        let last_used = stats.last_used.as_second();

        let result = sqlx::query(
            r#"
            UPDATE links
            SET clicks = GREATEST(clicks, ?),
                last_used = GREATEST(COALESCE(last_used, ?), ?)
            WHERE short_code = ?
            "#,
        )
        .bind(stats.clicks)
        .bind(last_used)
        .bind(last_used)
        .bind(code.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        // MySQL reports changed rows, so an update that changes nothing reads as zero.
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        self.exists(code).await
    }
}
