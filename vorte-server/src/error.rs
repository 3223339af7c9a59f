//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use vorte_core::ChallengeError;

use crate::handlers::challenge::{
    CHALLENGE_CACHE_CONTROL, FINGERPRINT_HEADER, RATELIMIT_LIMIT, RATELIMIT_REMAINING,
    RATELIMIT_RESET,
};

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Not implemented - the deployment lacks a required component
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Challenge core error
    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a not implemented error
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Challenge(ref e) => match e {
                ChallengeError::InvalidFingerprint => StatusCode::BAD_REQUEST,
                ChallengeError::OriginNotAllowed => StatusCode::FORBIDDEN,
                ChallengeError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                ChallengeError::TransactionNotFound => StatusCode::NOT_FOUND,
                ChallengeError::RandomnessUnavailable(_) | ChallengeError::InvalidConfig(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::NotImplemented(_) => "VERIFICATION_UNAVAILABLE",
            Self::Challenge(ref e) => match e {
                ChallengeError::InvalidFingerprint => "INVALID_FINGERPRINT",
                ChallengeError::OriginNotAllowed => "ORIGIN_NOT_ALLOWED",
                ChallengeError::RateLimited { .. } => "RATE_LIMITED",
                ChallengeError::TransactionNotFound => "TRANSACTION_NOT_FOUND",
                ChallengeError::RandomnessUnavailable(_) => "RANDOMNESS_UNAVAILABLE",
                ChallengeError::InvalidConfig(_) => "INTERNAL_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            // Core errors never echo configuration or OS details
            Self::Challenge(ref e) => match e {
                ChallengeError::InvalidFingerprint => {
                    "X-Fingerprint header is required or invalid".to_string()
                }
                ChallengeError::OriginNotAllowed => "Origin not allowed".to_string(),
                ChallengeError::RateLimited { window_secs, .. } => {
                    rate_limit_message(*window_secs)
                }
                ChallengeError::TransactionNotFound => {
                    "Transaction not found or expired".to_string()
                }
                ChallengeError::RandomnessUnavailable(_) => {
                    "Secure randomness unavailable".to_string()
                }
                ChallengeError::InvalidConfig(_) => "Internal server error".to_string(),
            },
            Self::BadRequest(message) | Self::NotImplemented(message) => message.clone(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotImplemented(_) => "not_implemented",
            Self::Challenge(_) => "challenge",
        }
    }

    /// Retry hint and window for rate-limit responses
    fn rate_limit(&self) -> Option<(u64, u64)> {
        match self {
            Self::Challenge(ChallengeError::RateLimited {
                retry_after_secs,
                window_secs,
            }) => Some((*retry_after_secs, *window_secs)),
            _ => None,
        }
    }
}

fn rate_limit_message(window_secs: u64) -> String {
    format!("Only 1 challenge per {window_secs} seconds (per fingerprint)")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        match &self {
            Self::Challenge(ChallengeError::TransactionNotFound) => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Unknown transaction (expired, reused or replayed)"
                );
            }
            Self::Challenge(ChallengeError::RandomnessUnavailable(_))
            | Self::Challenge(ChallengeError::InvalidConfig(_)) => {
                tracing::error!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Server error"
                );
            }
            Self::NotImplemented(_) => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Not implemented"
                );
            }
            _ => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Client error"
                );
            }
        }

        // All error responses include a `code` field for programmatic error handling
        let body = Json(serde_json::json!({
            "success": false,
            "error": client_message,
            "code": code,
        }));

        match self.rate_limit() {
            Some((retry_after_secs, window_secs)) => (
                status,
                [
                    (RATELIMIT_LIMIT, format!("1;w={window_secs}")),
                    (RATELIMIT_REMAINING, "0".to_string()),
                    (RATELIMIT_RESET, retry_after_secs.to_string()),
                    (header::RETRY_AFTER, retry_after_secs.to_string()),
                    (header::CACHE_CONTROL, CHALLENGE_CACHE_CONTROL.to_string()),
                    (header::VARY, FINGERPRINT_HEADER.to_string()),
                ],
                body,
            )
                .into_response(),
            None => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_error_mapping() {
        let cases = [
            (ChallengeError::InvalidFingerprint, 400, "INVALID_FINGERPRINT"),
            (ChallengeError::OriginNotAllowed, 403, "ORIGIN_NOT_ALLOWED"),
            (ChallengeError::TransactionNotFound, 404, "TRANSACTION_NOT_FOUND"),
            (
                ChallengeError::RandomnessUnavailable("getrandom: ENOSYS".into()),
                500,
                "RANDOMNESS_UNAVAILABLE",
            ),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status_code().as_u16(), status);
            assert_eq!(api.error_code(), code);
        }
    }

    #[test]
    fn test_client_messages_are_sanitized() {
        let err = ApiError::from(ChallengeError::RandomnessUnavailable("ENOSYS".into()));
        assert_eq!(err.client_message(), "Secure randomness unavailable");

        let err = ApiError::from(ChallengeError::InvalidConfig(
            "allowed origin \"redis://10.0.0.3\" is not http(s)".into(),
        ));
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limited_response_headers() {
        let err = ApiError::from(ChallengeError::RateLimited {
            retry_after_secs: 42,
            window_secs: 60,
        });
        assert_eq!(
            err.client_message(),
            "Only 1 challenge per 60 seconds (per fingerprint)"
        );

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers[RATELIMIT_LIMIT], "1;w=60");
        assert_eq!(headers[RATELIMIT_REMAINING], "0");
        assert_eq!(headers[RATELIMIT_RESET], "42");
        assert_eq!(headers[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_non_rate_limit_errors_carry_no_rate_limit_headers() {
        let response = ApiError::from(ChallengeError::InvalidFingerprint).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(RATELIMIT_LIMIT).is_none());
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_rate_limit_headers_follow_the_configured_window() {
        let err: ApiError = ChallengeError::RateLimited {
            retry_after_secs: 7,
            window_secs: 30,
        }
        .into();
        assert_eq!(
            err.client_message(),
            "Only 1 challenge per 30 seconds (per fingerprint)"
        );

        let response = err.into_response();
        assert_eq!(response.headers()[RATELIMIT_LIMIT], "1;w=30");
        assert_eq!(response.headers()[RATELIMIT_RESET], "7");
    }
}
