//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 specification for the Vorte credentials API.

use utoipa::OpenApi;

use crate::handlers::{
    AttestationResponse, ChallengeOptions, ChallengeResponse, ChallengeResult, CredentialPayload,
    HealthResponse, ReadyResponse, RegisterRequest, RegisterResponse, RegisteredCredential,
};

/// Vorte credentials API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vorte - Credentials API",
        version = "0.1.0",
        description = r#"
## WebAuthn challenge issuance

1. `GET /api/v1/webauthn/challenge` with an `X-Fingerprint` header returns a
   single-use challenge and a transaction identifier
2. The browser runs `navigator.credentials.create` with the returned options
3. `POST /api/v1/webauthn/register` echoes the transaction identifier with the
   attestation

Each fingerprint may request one challenge per window (60 seconds by default).
Transactions are single-use and expire after five minutes.
"#,
        license(
            name = "MIT OR Apache-2.0",
            url = "https://github.com/vorte-app/vorte-credentials/blob/main/LICENSE"
        )
    ),
    servers(
        (url = "http://localhost:8787", description = "Local development server"),
        (url = "https://vorte.app", description = "Production")
    ),
    tags(
        (name = "WebAuthn", description = "Challenge issuance and registration completion"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::challenge::challenge_handler,
        crate::handlers::register::register_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            ChallengeResponse,
            ChallengeResult,
            ChallengeOptions,
            RegisterRequest,
            CredentialPayload,
            AttestationResponse,
            RegisterResponse,
            RegisteredCredential,
        )
    )
)]
pub struct ApiDoc;
