//! Vorte Server Library - REST API for WebAuthn challenge issuance
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod config;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod validation;

pub use config::Config;
pub use error::ApiError;
pub use handlers::{CredentialVerifier, RegisteredCredential, UnconfiguredVerifier};
pub use openapi::ApiDoc;
pub use routes::{create_router_with_config, create_router_with_state};
pub use state::{spawn_sweeper, AppState};
