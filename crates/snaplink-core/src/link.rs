use crate::error::{CoreError, Result};
use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of the authenticated owner of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OwnerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| CoreError::InvalidOwner(format!("'{s}': {e}")))
    }
}

/// The canonical, durable record of a shortened link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: u64,
    pub short_code: ShortCode,
    pub original_url: String,
    pub owner: Option<OwnerId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub clicks: u64,
    pub last_used: Option<Timestamp>,
}

impl LinkRecord {
    /// A link is expired once `now` has reached its expiry.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Whether `requester` may mutate this link.
    ///
    /// Anonymous links can be changed by anyone; owned links only by their owner.
    pub fn is_mutable_by(&self, requester: Option<&OwnerId>) -> bool {
        match &self.owner {
            None => true,
            Some(owner) => requester == Some(owner),
        }
    }
}

/// The fields supplied when inserting a new link.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub short_code: ShortCode,
    pub original_url: String,
    pub owner: Option<OwnerId>,
    pub expires_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;

    fn record(owner: Option<OwnerId>, expires_at: Option<Timestamp>) -> LinkRecord {
        let now = Timestamp::now();
        LinkRecord {
            id: 1,
            short_code: ShortCode::new_unchecked("abc123"),
            original_url: "https://example.com".to_string(),
            owner,
            created_at: now,
            updated_at: now,
            expires_at,
            clicks: 0,
            last_used: None,
        }
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Timestamp::now();
        assert!(record(None, Some(now)).is_expired_at(now));
        assert!(!record(None, Some(now + SignedDuration::from_secs(1))).is_expired_at(now));
        assert!(!record(None, None).is_expired_at(now));
    }

    #[test]
    fn anonymous_links_are_mutable_by_anyone() {
        let someone = OwnerId::new(Uuid::new_v4());
        let link = record(None, None);
        assert!(link.is_mutable_by(None));
        assert!(link.is_mutable_by(Some(&someone)));
    }

    #[test]
    fn owned_links_are_mutable_only_by_owner() {
        let owner = OwnerId::new(Uuid::new_v4());
        let stranger = OwnerId::new(Uuid::new_v4());
        let link = record(Some(owner), None);
        assert!(link.is_mutable_by(Some(&owner)));
        assert!(!link.is_mutable_by(Some(&stranger)));
        assert!(!link.is_mutable_by(None));
    }

    #[test]
    fn owner_id_parses_uuid() {
        let id = Uuid::new_v4();
        let parsed: OwnerId = id.to_string().parse().unwrap();
        assert_eq!(parsed.as_uuid(), &id);
        assert!("not-a-uuid".parse::<OwnerId>().is_err());
    }
}
