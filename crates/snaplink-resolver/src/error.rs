use snaplink_core::{CacheError, ServiceError, StorageError};
use thiserror::Error;

/// A backend failed while resolving. Never retried.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("cache failure during resolution: {0}")]
    Cache(#[from] CacheError),
    #[error("storage failure during resolution: {0}")]
    Storage(#[from] StorageError),
}

impl From<ResolveError> for ServiceError {
    fn from(value: ResolveError) -> Self {
        ServiceError::Internal(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
