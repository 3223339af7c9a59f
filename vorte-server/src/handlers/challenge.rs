//! Challenge issuance handler

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use vorte_core::{ChallengeGrant, ChallengeRequest};

use crate::error::ApiError;
use crate::state::AppState;

/// Client fingerprint header
pub const FINGERPRINT_HEADER: &str = "x-fingerprint";

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Challenges are per-client and must not be shared by intermediaries
pub const CHALLENGE_CACHE_CONTROL: &str = "private, max-age=60, s-maxage=0";

/// WebAuthn options the browser passes to `navigator.credentials.create`
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeOptions {
    /// Base64url-encoded 32-byte challenge (43 characters, unpadded)
    #[schema(example = "q3Jk0b4wC3hXy1u9ZP8i2oQyQm9mL7Zt0uJ3n4x1a2E")]
    pub challenge: String,
    /// Relying party identifier
    #[schema(example = "vorte.app")]
    pub rp_id: String,
    /// User verification requirement
    #[schema(example = "required")]
    pub user_verification: String,
    /// Ceremony timeout in milliseconds
    #[schema(example = 60000)]
    pub timeout: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResult {
    /// Identifier to echo back on completion
    #[schema(example = "0ff72376-a0b7-4a92-a2e9-a117ef916302")]
    pub transaction_id: String,
    pub options: ChallengeOptions,
}

/// Successful challenge response
#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub success: bool,
    pub result: ChallengeResult,
}

impl From<&ChallengeGrant> for ChallengeResponse {
    fn from(grant: &ChallengeGrant) -> Self {
        let issued = &grant.issued;
        Self {
            success: true,
            result: ChallengeResult {
                transaction_id: issued.transaction_id.to_string(),
                options: ChallengeOptions {
                    challenge: issued.challenge.encoded(),
                    rp_id: issued.rp_id.to_string(),
                    user_verification: issued.user_verification.as_str().to_string(),
                    timeout: issued.timeout_ms,
                },
            },
        }
    }
}

/// GET /api/v1/webauthn/challenge - Issue a WebAuthn challenge
///
/// One challenge per fingerprint per window. The RP ID is derived from the
/// request host.
#[utoipa::path(
    get,
    path = "/api/v1/webauthn/challenge",
    tag = "WebAuthn",
    params(
        ("X-Fingerprint" = String, Header, description = "32 hexadecimal characters identifying the client"),
        ("Origin" = Option<String>, Header, description = "Browser origin; must be allow-listed when present")
    ),
    responses(
        (status = 200, description = "Challenge issued", body = ChallengeResponse),
        (status = 400, description = "Missing or invalid X-Fingerprint header"),
        (status = 403, description = "Origin not allowed"),
        (status = 429, description = "Only one challenge per window per fingerprint"),
        (status = 500, description = "Secure randomness unavailable")
    )
)]
pub async fn challenge_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let request = ChallengeRequest {
        origin: header_str(&headers, header::ORIGIN.as_str()),
        fingerprint: header_str(&headers, FINGERPRINT_HEADER),
        host: request_host(&headers, &uri),
    };

    let grant = state.service.request_challenge(request)?;

    Ok((
        [
            (RATELIMIT_LIMIT, format!("1;w={}", grant.window_secs)),
            (RATELIMIT_REMAINING, "0".to_string()),
            (RATELIMIT_RESET, grant.window_secs.to_string()),
            (header::CACHE_CONTROL, CHALLENGE_CACHE_CONTROL.to_string()),
            (header::VARY, FINGERPRINT_HEADER.to_string()),
        ],
        Json(ChallengeResponse::from(&grant)),
    )
        .into_response())
}

/// Header value as text; non-UTF-8 values count as absent.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `Host` header, then the URI authority, then `localhost`.
fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> &'a str {
    header_str(headers, header::HOST.as_str())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost")
}
