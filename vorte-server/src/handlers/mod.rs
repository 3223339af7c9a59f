//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod challenge;
pub mod health;
pub mod register;

pub use crate::state::AppState;
pub use challenge::{challenge_handler, ChallengeOptions, ChallengeResponse, ChallengeResult};
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use register::{
    register_handler, AttestationResponse, CredentialPayload, CredentialVerifier,
    RegisterRequest, RegisterResponse, RegisteredCredential, UnconfiguredVerifier,
};
