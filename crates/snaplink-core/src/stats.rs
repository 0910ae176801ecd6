use crate::error::CacheError;
use crate::link::LinkRecord;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Usage counters held in the cache between reconciliations.
///
/// The wire form is a fixed JSON object, `{"clicks": 3, "last_used": "..."}`;
/// readers reject anything else so writer and reader cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsEntry {
    pub clicks: u64,
    pub last_used: Timestamp,
}

impl StatsEntry {
    /// Stats seeded from the durable click count plus the hit being served.
    pub fn seeded(baseline_clicks: u64, now: Timestamp) -> Self {
        Self {
            clicks: baseline_clicks.saturating_add(1),
            last_used: now,
        }
    }

    /// Returns these stats with one more hit recorded at `now`.
    pub fn hit(self, now: Timestamp) -> Self {
        Self {
            clicks: self.clicks.saturating_add(1),
            last_used: now.max(self.last_used),
        }
    }

    /// Overlays these cache-held stats on a durable record's baseline.
    ///
    /// Neither counter moves backwards, matching how the store applies stats.
    pub fn merge_into(&self, record: &mut LinkRecord) {
        record.clicks = record.clicks.max(self.clicks);
        record.last_used = Some(match record.last_used {
            Some(stored) => stored.max(self.last_used),
            None => self.last_used,
        });
    }

    pub fn encode(&self) -> Result<String, CacheError> {
        serde_json::to_string(self)
            .map_err(|e| CacheError::Serialization(format!("failed to encode stats: {e}")))
    }

    pub fn decode(raw: &str) -> Result<Self, CacheError> {
        serde_json::from_str(raw)
            .map_err(|e| CacheError::InvalidData(format!("invalid stats payload '{raw}': {e}")))
    }
}
