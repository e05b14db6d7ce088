// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the fleet key gateway.

use crate::fleet::FleetError;
use crate::limiter::LimiterError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Too Many Requests")]
    RateLimited { retry_after: Duration },

    #[error("{0}")]
    BadRequest(String),

    #[error("Public key not found")]
    PublicKeyNotFound,

    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error("Invalid rate limit configuration: {0}")]
    Limiter(#[from] LimiterError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// JSON error body, `{"error": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PublicKeyNotFound => StatusCode::NOT_FOUND,
            Self::Fleet(e) if e.is_transport() => StatusCode::BAD_GATEWAY,
            Self::Fleet(_) | Self::Limiter(_) | Self::Metrics(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Whole seconds to wait, rounded up and never zero.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::PublicKeyNotFound => (status, self.to_string()).into_response(),
            Self::RateLimited { retry_after } => (
                status,
                [(header::RETRY_AFTER, retry_after_secs(retry_after).to_string())],
                Json(ErrorResponse {
                    error: self.to_string(),
                }),
            )
                .into_response(),
            _ => (
                status,
                Json(ErrorResponse {
                    error: self.to_string(),
                }),
            )
                .into_response(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(2)), 2);
        assert_eq!(retry_after_secs(Duration::from_millis(59_001)), 60);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(FleetError::TokenRejected("invalid_client".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_response_sets_retry_after() {
        let response = AppError::RateLimited {
            retry_after: Duration::from_millis(1500),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }
}
