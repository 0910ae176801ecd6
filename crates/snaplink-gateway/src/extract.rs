use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use snaplink_core::OwnerId;

use crate::error::AppError;

/// Header carrying the identity established by the upstream auth layer.
pub const OWNER_HEADER: &str = "x-owner-id";

fn owner_from_parts(parts: &Parts) -> Result<Option<OwnerId>, AppError> {
    let Some(value) = parts.headers.get(OWNER_HEADER) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<OwnerId>().ok())
        .map(Some)
        .ok_or_else(|| AppError::Unauthorized(format!("malformed {OWNER_HEADER} header")))
}

/// The caller's identity, if any.
#[derive(Debug, Clone, Copy)]
pub struct Requester(pub Option<OwnerId>);

impl<S: Send + Sync> FromRequestParts<S> for Requester {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        owner_from_parts(parts).map(Requester)
    }
}

/// The caller's identity; rejects anonymous requests with 401.
#[derive(Debug, Clone, Copy)]
pub struct Owner(pub OwnerId);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        owner_from_parts(parts)?
            .map(Owner)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {OWNER_HEADER} header")))
    }
}
