use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use snaplink_core::{CoreError, ServiceError};
use snaplink_resolver::ResolveError;
use thiserror::Error;
use tracing::error;

use crate::model::ErrorResponse;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    BadRequest(String),
}

impl From<CoreError> for AppError {
    fn from(value: CoreError) -> Self {
        Self::Service(value.into())
    }
}

impl From<ResolveError> for AppError {
    fn from(value: ResolveError) -> Self {
        Self::Service(value.into())
    }
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Service(ServiceError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Service(ServiceError::Gone(_)) => (StatusCode::GONE, "gone"),
            AppError::Service(ServiceError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
            AppError::Service(ServiceError::Forbidden(_)) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Service(ServiceError::Invalid(_)) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, "invalid")
            }
            AppError::Service(ServiceError::Internal(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: kind,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (ServiceError::Gone("a".into()), StatusCode::GONE),
            (ServiceError::Conflict("a".into()), StatusCode::CONFLICT),
            (ServiceError::Forbidden("a".into()), StatusCode::FORBIDDEN),
            (ServiceError::Invalid("a".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Internal("a".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn unauthorized_is_401() {
        let response = AppError::Unauthorized("who are you".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
