use snaplink_core::{ServiceError, StorageError};
use thiserror::Error;

/// Failures of the code allocation protocol.
#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    /// A caller-supplied alias is already taken. Never retried.
    #[error("alias already exists: {0}")]
    Conflict(String),
    /// Every generated candidate collided with an existing code.
    #[error("no free short code after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },
    #[error(transparent)]
    Storage(StorageError),
}

impl From<ShortenerError> for ServiceError {
    fn from(value: ShortenerError) -> Self {
        match value {
            ShortenerError::Conflict(alias) => {
                ServiceError::Conflict(format!("alias '{alias}' is already in use"))
            }
            ShortenerError::AllocationExhausted { .. } => ServiceError::Internal(value.to_string()),
            ShortenerError::Storage(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_is_internal() {
        let err: ServiceError = ShortenerError::AllocationExhausted { attempts: 5 }.into();
        assert!(matches!(err, ServiceError::Internal(msg) if msg.contains("5 attempts")));
    }

    #[test]
    fn alias_conflict_is_conflict() {
        let err: ServiceError = ShortenerError::Conflict("mine".to_string()).into();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}
