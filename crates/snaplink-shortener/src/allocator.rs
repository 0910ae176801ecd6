use crate::error::ShortenerError;
use jiff::Timestamp;
use snaplink_core::{LinkRecord, NewLink, OwnerId, Repository, ShortCode, StorageError};
use snaplink_generator::Generator;
use std::sync::Arc;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

/// Default bound on generated candidates per allocation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, TypedBuilder)]
pub struct AllocatorSettings {
    /// How many generated candidates to try before giving up.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything about a new link except its code.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDraft {
    pub original_url: String,
    pub owner: Option<OwnerId>,
    pub expires_at: Option<Timestamp>,
}

impl LinkDraft {
    fn with_code(&self, short_code: ShortCode) -> NewLink {
        NewLink {
            short_code,
            original_url: self.original_url.clone(),
            owner: self.owner,
            expires_at: self.expires_at,
        }
    }
}

/// Reserves a short code by inserting the link under it.
///
/// The store's atomic insert-or-fail is the only uniqueness check: a
/// caller-supplied alias gets exactly one insert, generated codes are retried
/// on collision up to the configured bound.
#[derive(Debug)]
pub struct CodeAllocator<R: ?Sized, G> {
    repository: Arc<R>,
    generator: G,
    max_attempts: u32,
}

impl<R, G> CodeAllocator<R, G>
where
    R: Repository + ?Sized,
    G: Generator,
{
    pub fn new(repository: Arc<R>, generator: G, settings: AllocatorSettings) -> Self {
        Self {
            repository,
            generator,
            max_attempts: settings.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Inserts `draft` under `alias`, or under a freshly generated code.
    pub async fn allocate(
        &self,
        draft: &LinkDraft,
        alias: Option<ShortCode>,
    ) -> Result<LinkRecord, ShortenerError> {
        match alias {
            Some(alias) => self.insert_alias(draft, alias).await,
            None => self.insert_generated(draft).await,
        }
    }

    async fn insert_alias(
        &self,
        draft: &LinkDraft,
        alias: ShortCode,
    ) -> Result<LinkRecord, ShortenerError> {
        match self.repository.insert(draft.with_code(alias)).await {
            Ok(record) => Ok(record),
            Err(StorageError::Conflict(code)) => {
                debug!(code = %code, "Custom alias already taken");
                Err(ShortenerError::Conflict(code))
            }
            Err(e) => Err(ShortenerError::Storage(e)),
        }
    }

    async fn insert_generated(&self, draft: &LinkDraft) -> Result<LinkRecord, ShortenerError> {
        for attempt in 1..=self.max_attempts {
            let candidate: ShortCode = self.generator.generate().into();

            match self.repository.insert(draft.with_code(candidate)).await {
                Ok(record) => return Ok(record),
                Err(StorageError::Conflict(code)) => {
                    debug!(code = %code, attempt, "Generated code collided, retrying");
                }
                Err(e) => return Err(ShortenerError::Storage(e)),
            }
        }

        warn!(
            attempts = self.max_attempts,
            "Gave up allocating a short code"
        );
        Err(ShortenerError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }
}
