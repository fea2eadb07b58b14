// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP error envelope: `{"error": {"code": ..., "message": ...}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::domain::error::DomainError;
use crate::presentation::auth::AuthError;
use crate::resilience::WorkloadClass;

/// Response extension marking a rejection made by admission control
/// (rate limit or bulkhead). Circuit breakers do not count these.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionRejected;

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    admission: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            admission: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn circuit_open() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "CIRCUIT_OPEN",
            "service temporarily unavailable",
        )
    }

    pub fn capacity_exceeded(class: WorkloadClass) -> Self {
        Self {
            admission: true,
            ..Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "CAPACITY_EXCEEDED",
                format!("{class} capacity exceeded, please retry shortly"),
            )
        }
    }

    pub fn rate_limited() -> Self {
        Self {
            admission: true,
            ..Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "too many requests, please try again later",
            )
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", "insufficient permissions")
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION", message)
    }

    pub fn idempotency_in_progress() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "a request with this idempotency key is still in progress",
        )
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL",
            "internal server error",
        )
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        if let DomainError::Internal(detail) = &err {
            error!(error = %detail, "Request failed");
            return Self::internal();
        }
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UnknownRole(_) | AuthError::EmptySubject => Self::validation(err.to_string()),
            AuthError::Signing(detail) => {
                error!(error = %detail, "Token signing failed");
                Self::internal()
            }
            other => Self::unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        let mut response = (self.status, body).into_response();
        if self.admission {
            response.extensions_mut().insert(AdmissionRejected);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_keep_their_codes() {
        let err = ApiError::from(DomainError::InvalidTransition {
            from: "DELIVERED",
            to: "WITHDRAWN",
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "INVALID_TRANSITION");

        let err = ApiError::from(DomainError::Internal("pool timed out".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal server error");
    }

    #[test]
    fn test_admission_rejections_are_marked() {
        let response = ApiError::rate_limited().into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.extensions().get::<AdmissionRejected>().is_some());

        let response = ApiError::circuit_open().into_response();
        assert!(response.extensions().get::<AdmissionRejected>().is_none());
    }
}
