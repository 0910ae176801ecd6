use thiserror::Error;

/// Result type for validation performed by core types.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out: {0}")]
    Timeout(String),
    #[error("cache serialization failed: {0}")]
    Serialization(String),
    #[error("cache value is invalid: {0}")]
    InvalidData(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid owner id: {0}")]
    InvalidOwner(String),
}

/// The error taxonomy exposed by link operations.
///
/// Every layer-specific error converts into one of these kinds; the HTTP
/// surface maps them onto status codes.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("short code has expired: {0}")]
    Gone(String),
    #[error("short code already taken: {0}")]
    Conflict(String),
    #[error("not the owner of short code: {0}")]
    Forbidden(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ServiceError {
    fn from(value: CoreError) -> Self {
        ServiceError::Invalid(value.to_string())
    }
}

impl From<CacheError> for ServiceError {
    fn from(value: CacheError) -> Self {
        ServiceError::Internal(value.to_string())
    }
}

impl From<StorageError> for ServiceError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(code) => ServiceError::Conflict(code),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}
