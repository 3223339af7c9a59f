//! Challenge service configuration
//!
//! One explicit value built at startup and handed to [`ChallengeService::new`].
//! Defaults reproduce the production deployment.
//!
//! [`ChallengeService::new`]: crate::service::ChallengeService::new

use std::time::Duration;

use crate::challenge::UserVerification;
use crate::error::{ChallengeError, Result};
use crate::origin::MissingOriginPolicy;

/// Default rate-limit window (one challenge per key per minute)
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Default WebAuthn ceremony timeout advertised to clients
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default lifetime of an unconsumed transaction (5 minutes)
pub const DEFAULT_TRANSACTION_TTL_SECS: u64 = 300;

/// Default bound on tracked rate-limit keys and pending transactions
pub const DEFAULT_CAPACITY: usize = 100_000;

#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Origins permitted to request challenges
    pub allowed_origins: Vec<String>,
    /// Behaviour when the `Origin` header is absent
    pub missing_origin: MissingOriginPolicy,
    /// Hosts that act as their own RP ID
    pub dev_hosts: Vec<String>,
    /// RP ID for every other host
    pub production_apex: String,
    /// One admission per (RP ID, fingerprint) per window
    pub window: Duration,
    /// `userVerification` advertised in the options
    pub user_verification: UserVerification,
    /// `timeout` advertised in the options
    pub timeout_ms: u64,
    /// How long an issued transaction remains redeemable
    pub transaction_ttl: Duration,
    /// Maximum tracked rate-limit keys
    pub rate_limit_capacity: usize,
    /// Maximum pending transactions
    pub transaction_capacity: usize,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:8787".to_string(),
                "https://vorte.app".to_string(),
            ],
            missing_origin: MissingOriginPolicy::Allow,
            dev_hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            production_apex: "vorte.app".to_string(),
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            user_verification: UserVerification::Required,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            transaction_ttl: Duration::from_secs(DEFAULT_TRANSACTION_TTL_SECS),
            rate_limit_capacity: DEFAULT_CAPACITY,
            transaction_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ChallengeConfig {
    /// Reject values that would disable a guarantee.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(invalid("rate-limit window must be non-zero"));
        }
        if self.transaction_ttl.is_zero() {
            return Err(invalid("transaction TTL must be non-zero"));
        }
        if self.rate_limit_capacity == 0 || self.transaction_capacity == 0 {
            return Err(invalid("store capacities must be non-zero"));
        }
        if self.production_apex.trim().is_empty() {
            return Err(invalid("production RP ID must not be empty"));
        }
        Ok(())
    }

    /// Window length in whole seconds, as advertised in rate-limit headers.
    pub fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}

fn invalid(message: &str) -> ChallengeError {
    ChallengeError::InvalidConfig(message.to_string())
}
