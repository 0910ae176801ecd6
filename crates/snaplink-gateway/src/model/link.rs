use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use snaplink_core::LinkRecord;

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    pub original_url: String,
    #[serde(default)]
    pub custom_alias: Option<String>,
    /// RFC 3339, e.g. `2030-01-01T00:00:00Z`.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Serialize)]
pub struct CreateLinkResponse {
    pub short_code: String,
    pub short_url: String,
    pub original_url: String,
    pub expires_at: Option<Timestamp>,
}

impl CreateLinkResponse {
    pub fn new(record: &LinkRecord, base_url: &str) -> Self {
        Self {
            short_code: record.short_code.to_string(),
            short_url: record.short_code.to_url(base_url),
            original_url: record.original_url.clone(),
            expires_at: record.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateLinkRequest {
    pub original_url: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteLinkResponse {
    pub short_code: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct LinkStatsResponse {
    pub short_code: String,
    pub original_url: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub clicks: u64,
    pub last_used: Option<Timestamp>,
}

impl From<LinkRecord> for LinkStatsResponse {
    fn from(record: LinkRecord) -> Self {
        Self {
            short_code: record.short_code.into(),
            original_url: record.original_url,
            created_at: record.created_at,
            updated_at: record.updated_at,
            expires_at: record.expires_at,
            clicks: record.clicks,
            last_used: record.last_used,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub original_url: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub short_url: String,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

impl SearchResult {
    pub fn new(record: &LinkRecord, base_url: &str) -> Self {
        Self {
            short_url: record.short_code.to_url(base_url),
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}
