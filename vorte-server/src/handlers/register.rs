//! Registration-completion handler
//!
//! Consumes the transaction named in the request and hands the stored
//! challenge plus the browser's attestation to a [`CredentialVerifier`].
//! The transaction is single-use: it is gone after this call whether or not
//! verification succeeds.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use vorte_core::Transaction;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::validate_register_request;

/// Attestation fields produced by `navigator.credentials.create`
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    /// Base64url client data
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    /// Base64url CBOR attestation object
    pub attestation_object: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CredentialPayload {
    /// Base64url credential identifier
    pub id: String,
    pub response: AttestationResponse,
}

/// Registration-completion request body
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Transaction identifier returned with the challenge
    #[schema(example = "0ff72376-a0b7-4a92-a2e9-a117ef916302")]
    pub transaction_id: String,
    pub credential: CredentialPayload,
}

/// Outcome of a successful attestation check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredCredential {
    pub user_id: String,
    pub credential_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub success: bool,
    pub result: RegisteredCredential,
}

/// Checks a browser attestation against the challenge it was issued for.
pub trait CredentialVerifier: Send + Sync {
    fn verify(
        &self,
        transaction: &Transaction,
        credential: &CredentialPayload,
    ) -> Result<RegisteredCredential, ApiError>;
}

/// Verifier used when no attestation backend is configured. Always refuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredVerifier;

impl CredentialVerifier for UnconfiguredVerifier {
    fn verify(
        &self,
        transaction: &Transaction,
        _credential: &CredentialPayload,
    ) -> Result<RegisteredCredential, ApiError> {
        tracing::warn!(
            transaction_id = %transaction.transaction_id,
            "No credential verifier configured, refusing registration"
        );
        Err(ApiError::not_implemented(
            "Credential verification is not configured",
        ))
    }
}

/// POST /api/v1/webauthn/register - Finalize credential registration
#[utoipa::path(
    post,
    path = "/api/v1/webauthn/register",
    tag = "WebAuthn",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Credential registered", body = RegisterResponse),
        (status = 400, description = "Invalid or missing fields"),
        (status = 404, description = "Transaction unknown, expired or already used"),
        (status = 501, description = "Credential verification not configured")
    )
)]
pub async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    validate_register_request(&request)?;

    let transaction = state
        .service
        .complete_registration(&request.transaction_id)?;

    let registered = state.verifier.verify(&transaction, &request.credential)?;

    tracing::info!(
        transaction_id = %transaction.transaction_id,
        rp_id = %transaction.rp_id,
        "Credential registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            result: registered,
        }),
    ))
}
