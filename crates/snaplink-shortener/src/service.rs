use crate::allocator::{AllocatorSettings, CodeAllocator, LinkDraft};
use jiff::{SignedDuration, Timestamp};
use snaplink_core::{
    normalize_url, LinkCache, LinkRecord, OwnerId, Repository, ServiceError, ShortCode,
};
use snaplink_generator::Generator;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, ServiceError>;

/// Input of [`LinkService::create`], as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct CreateLink {
    pub original_url: String,
    pub custom_alias: Option<String>,
    pub expires_at: Option<Timestamp>,
}

/// An owner's live links with cache-held stats folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerLinks {
    pub links: Vec<LinkRecord>,
    pub total_clicks: u64,
}

/// Link management: everything except resolution.
///
/// Mutations clear the cached entry and pending stats of the code they touch,
/// so in-flight redirects can only observe the old target for up to one
/// cache TTL.
#[derive(Debug)]
pub struct LinkService<R: ?Sized, C: ?Sized, G> {
    repository: Arc<R>,
    cache: Arc<C>,
    allocator: CodeAllocator<R, G>,
}

impl<R, C, G> LinkService<R, C, G>
where
    R: Repository + ?Sized,
    C: LinkCache + ?Sized,
    G: Generator,
{
    pub fn new(repository: Arc<R>, cache: Arc<C>, generator: G, settings: AllocatorSettings) -> Self {
        Self {
            allocator: CodeAllocator::new(repository.clone(), generator, settings),
            repository,
            cache,
        }
    }

    /// Creates a link under `custom_alias` or a generated code.
    pub async fn create(&self, request: CreateLink, owner: Option<OwnerId>) -> Result<LinkRecord> {
        let original_url = normalize_url(&request.original_url)?;
        let alias = request.custom_alias.map(ShortCode::new).transpose()?;

        if let Some(expires_at) = request.expires_at {
            if expires_at <= Timestamp::now() {
                return Err(ServiceError::Invalid(format!(
                    "expires_at {expires_at} is not in the future"
                )));
            }
        }

        let draft = LinkDraft {
            original_url,
            owner,
            expires_at: request.expires_at,
        };
        let record = self.allocator.allocate(&draft, alias).await?;

        info!(code = %record.short_code, owned = record.owner.is_some(), "Created link");
        Ok(record)
    }

    /// Points `code` at a new target. Usage stats start over.
    pub async fn update(
        &self,
        code: &ShortCode,
        original_url: &str,
        requester: Option<OwnerId>,
    ) -> Result<LinkRecord> {
        let original_url = normalize_url(original_url)?;
        let now = Timestamp::now();
        let record = self.mutable_record(code, requester.as_ref()).await?;
        if record.is_expired_at(now) {
            return Err(ServiceError::Gone(code.to_string()));
        }

        self.cache.invalidate(code).await?;
        let updated = self
            .repository
            .update_target(code, &original_url, now)
            .await?
            .ok_or_else(|| ServiceError::NotFound(code.to_string()))?;

        // A redirect racing the update may have re-seeded the old target.
        if let Err(e) = self.cache.invalidate(code).await {
            warn!(code = %code, error = %e, "Failed to invalidate cache after update");
        }

        info!(code = %code, "Updated link target");
        Ok(updated)
    }

    /// Deletes `code`. Deleting a missing code is `NotFound`.
    pub async fn delete(&self, code: &ShortCode, requester: Option<OwnerId>) -> Result<()> {
        self.mutable_record(code, requester.as_ref()).await?;

        self.cache.invalidate(code).await?;
        if !self.repository.delete(code).await? {
            return Err(ServiceError::NotFound(code.to_string()));
        }

        info!(code = %code, "Deleted link");
        Ok(())
    }

    /// The durable record with any pending cache stats folded in.
    ///
    /// Expired links still report their stats.
    pub async fn stats(&self, code: &ShortCode) -> Result<LinkRecord> {
        let mut record = self
            .repository
            .get(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(code.to_string()))?;

        self.merge_pending(&mut record).await?;
        Ok(record)
    }

    /// Live links pointing at `original_url`, normalized the way `create` stores it.
    pub async fn search(&self, original_url: &str) -> Result<Vec<LinkRecord>> {
        let original_url = normalize_url(original_url)?;
        let found = self
            .repository
            .search_by_url(&original_url, Timestamp::now())
            .await?;

        debug!(url = %original_url, matches = found.len(), "Searched links by target");
        Ok(found)
    }

    /// Every live link of `owner`, with its click total.
    pub async fn owner_links(&self, owner: &OwnerId) -> Result<OwnerLinks> {
        let mut links = self
            .repository
            .list_by_owner(owner, Timestamp::now())
            .await?;

        for record in &mut links {
            self.merge_pending(record).await?;
        }
        let total_clicks = links.iter().map(|record| record.clicks).sum();

        Ok(OwnerLinks {
            links,
            total_clicks,
        })
    }

    /// Deletes `owner`'s links created and last used before `older_than` ago.
    ///
    /// Returns how many links were removed.
    pub async fn remove_unused(&self, owner: &OwnerId, older_than: SignedDuration) -> Result<usize> {
        let cutoff = Timestamp::now()
            .checked_sub(older_than)
            .map_err(|e| ServiceError::Invalid(format!("cutoff out of range: {e}")))?;
        let candidates = self.repository.find_unused(owner, cutoff).await?;

        let mut removed = 0;
        for mut record in candidates {
            // Hits still waiting in the cache count as use.
            self.merge_pending(&mut record).await?;
            if record.last_used.is_some_and(|used| used >= cutoff) {
                continue;
            }

            self.cache.invalidate(&record.short_code).await?;
            if self.repository.delete(&record.short_code).await? {
                removed += 1;
            }
        }

        info!(owner = %owner, removed, cutoff = %cutoff, "Removed unused links");
        Ok(removed)
    }

    async fn mutable_record(&self, code: &ShortCode, requester: Option<&OwnerId>) -> Result<LinkRecord> {
        let record = self
            .repository
            .get(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(code.to_string()))?;

        if !record.is_mutable_by(requester) {
            debug!(code = %code, "Rejected mutation by non-owner");
            return Err(ServiceError::Forbidden(code.to_string()));
        }
        Ok(record)
    }

    async fn merge_pending(&self, record: &mut LinkRecord) -> Result<()> {
        if let Some(pending) = self.cache.get_stats(&record.short_code).await? {
            pending.merge_into(record);
        }
        Ok(())
    }
}
