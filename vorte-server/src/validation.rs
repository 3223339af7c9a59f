//! Request body validation module
//!
//! Shape checks for the registration-completion payload.

use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::register::RegisterRequest;

/// Minimum length of a base64url credential token
pub const MIN_TOKEN_LEN: usize = 16;

/// Validates a base64url token (`[A-Za-z0-9_-]`, at least 16 characters)
pub fn validate_token(field: &str, value: &str) -> Result<(), ApiError> {
    let well_formed = value.len() >= MIN_TOKEN_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');

    if well_formed {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "Invalid '{}': expected at least {} base64url characters",
            field, MIN_TOKEN_LEN
        )))
    }
}

/// Validates the registration-completion body
pub fn validate_register_request(request: &RegisterRequest) -> Result<(), ApiError> {
    Uuid::parse_str(&request.transaction_id)
        .map_err(|_| ApiError::bad_request("Invalid 'transactionId': expected a UUID"))?;

    validate_token("credential.id", &request.credential.id)?;
    validate_token(
        "credential.response.clientDataJSON",
        &request.credential.response.client_data_json,
    )?;
    validate_token(
        "credential.response.attestationObject",
        &request.credential.response.attestation_object,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::register::{AttestationResponse, CredentialPayload};

    const TOKEN: &str = "AAAAAAAAAAAAAAAA_-z9";

    fn request(transaction_id: &str, id: &str) -> RegisterRequest {
        RegisterRequest {
            transaction_id: transaction_id.to_string(),
            credential: CredentialPayload {
                id: id.to_string(),
                response: AttestationResponse {
                    client_data_json: TOKEN.to_string(),
                    attestation_object: TOKEN.to_string(),
                },
            },
        }
    }

    #[test]
    fn test_validate_token() {
        assert!(validate_token("id", TOKEN).is_ok());
        assert!(validate_token("id", "0123456789abcdef").is_ok()); // exactly 16
        assert!(validate_token("id", "0123456789abcde").is_err()); // 15
        assert!(validate_token("id", "AAAAAAAAAAAAAAAA+/").is_err()); // standard alphabet
        assert!(validate_token("id", "AAAAAAAAAAAAAAAA==").is_err()); // padding
        assert!(validate_token("id", "").is_err());
    }

    #[test]
    fn test_validate_register_request() {
        let ok = request("0ff72376-a0b7-4a92-a2e9-a117ef916302", TOKEN);
        assert!(validate_register_request(&ok).is_ok());

        let bad_id = request("not-a-uuid", TOKEN);
        assert!(matches!(
            validate_register_request(&bad_id),
            Err(ApiError::BadRequest(_))
        ));

        let bad_credential = request("0ff72376-a0b7-4a92-a2e9-a117ef916302", "short");
        assert!(validate_register_request(&bad_credential).is_err());
    }
}
