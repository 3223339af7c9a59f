//! Router configuration module
//!
//! Configures all routes, middleware layers, and creates the application router.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use vorte_core::ChallengeError;

use crate::config::Config;
use crate::handlers::challenge::{
    FINGERPRINT_HEADER, RATELIMIT_LIMIT, RATELIMIT_REMAINING, RATELIMIT_RESET,
};
use crate::handlers::{challenge_handler, health, ready, register_handler};
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Create the application router with a fresh state built from `config`
pub fn create_router_with_config(config: &Config) -> Result<Router, ChallengeError> {
    create_router_with_state(config, AppState::from_config(config)?)
}

/// Create the application router around an existing state
pub fn create_router_with_state(
    config: &Config,
    state: AppState,
) -> Result<Router, ChallengeError> {
    let cors = cors_layer(state.service.origin_gate().allowed_origins());

    // Request body limit
    let body_limit = RequestBodyLimitLayer::new(config.body_limit_kb * 1024);

    // Request timeout
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.timeout_secs),
    );

    let router = Router::new()
        .route("/api/v1/webauthn/challenge", get(challenge_handler))
        .route("/api/v1/webauthn/register", post(register_handler))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
        .merge(
            SwaggerUi::new("/api/v1/webauthn/docs")
                .url("/api/v1/webauthn/openapi.json", ApiDoc::openapi()),
        )
        .layer(cors)
        .layer(body_limit)
        .layer(timeout);

    // Conditionally apply the per-IP throttle (disabled in tests, enabled in production)
    if config.rate_limit_enabled {
        let governor_conf = GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_sec)
            .burst_size(config.rate_limit_burst)
            .finish()
            .ok_or_else(|| {
                ChallengeError::InvalidConfig(
                    "per-IP rate limit and burst must be non-zero".to_string(),
                )
            })?;

        tracing::info!(
            "Per-IP throttle: {} req/s (burst: {})",
            config.rate_limit_per_sec,
            config.rate_limit_burst
        );

        Ok(router
            .layer(GovernorLayer::new(Arc::new(governor_conf)))
            .layer(TraceLayer::new_for_http()))
    } else {
        tracing::warn!("Per-IP throttle: DISABLED");
        Ok(router.layer(TraceLayer::new_for_http()))
    }
}

/// CORS restricted to the challenge allow-list, credentials included
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    tracing::info!("CORS: Restricting to {} origin(s)", origins.len());

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(FINGERPRINT_HEADER),
        ])
        .expose_headers([
            RATELIMIT_LIMIT,
            RATELIMIT_REMAINING,
            RATELIMIT_RESET,
            header::RETRY_AFTER,
            header::CACHE_CONTROL,
        ])
        .max_age(Duration::from_secs(600))
}
