//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use vorte_core::{ChallengeConfig, ChallengeError, MissingOriginPolicy, UserVerification};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8787)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Challenge issuance settings shared with the core service
    pub challenge: ChallengeConfig,
    /// Interval between background sweeps of expired state in seconds (default: 60)
    pub sweep_interval_secs: u64,
    /// Request body limit in KB (default: 64)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Per-IP request throttle in front of every route (default: false for tests)
    pub rate_limit_enabled: bool,
    /// Per-IP throttle: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Per-IP throttle: burst size (default: 20)
    pub rate_limit_burst: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8787,
            host: [127, 0, 0, 1],
            challenge: ChallengeConfig::default(),
            sweep_interval_secs: 60,
            body_limit_kb: 64,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ChallengeError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Unparseable numbers fall back to their defaults; unknown policy names
    /// are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ChallengeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());

        let port = lookup("PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(defaults.port);

        let host = lookup("HOST")
            .map(|h| {
                if h.trim() == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or(defaults.host);

        let mut challenge = defaults.challenge;

        if let Some(origins) = lookup("ALLOWED_ORIGINS").map(|v| split_list(&v)) {
            if !origins.is_empty() {
                challenge.allowed_origins = origins;
            }
        }
        if let Some(policy) = lookup("MISSING_ORIGIN_POLICY") {
            challenge.missing_origin = MissingOriginPolicy::from_str(&policy)?;
        }
        if let Some(apex) = lookup("RP_PRODUCTION_APEX").filter(|v| !v.trim().is_empty()) {
            challenge.production_apex = apex.trim().to_string();
        }
        if let Some(hosts) = lookup("RP_DEV_HOSTS").map(|v| split_list(&v)) {
            challenge.dev_hosts = hosts;
        }
        if let Some(secs) = parsed("CHALLENGE_WINDOW_SECS") {
            challenge.window = Duration::from_secs(secs);
        }
        if let Some(timeout_ms) = parsed("CHALLENGE_TIMEOUT_MS") {
            challenge.timeout_ms = timeout_ms;
        }
        if let Some(uv) = lookup("USER_VERIFICATION") {
            challenge.user_verification = UserVerification::from_str(&uv)?;
        }
        if let Some(secs) = parsed("TRANSACTION_TTL_SECS") {
            challenge.transaction_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = parsed("RATE_LIMIT_CAPACITY") {
            challenge.rate_limit_capacity = usize::try_from(capacity).unwrap_or(usize::MAX);
        }
        if let Some(capacity) = parsed("TRANSACTION_CAPACITY") {
            challenge.transaction_capacity = usize::try_from(capacity).unwrap_or(usize::MAX);
        }
        challenge.validate()?;

        let sweep_interval_secs = parsed("SWEEP_INTERVAL_SECS")
            .filter(|secs| *secs > 0)
            .unwrap_or(defaults.sweep_interval_secs);

        let body_limit_kb = lookup("BODY_LIMIT_KB")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.body_limit_kb);

        let timeout_secs = parsed("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs);

        // Throttle enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = lookup("RATE_LIMIT_ENABLED")
            .map(|v| v.trim().to_lowercase() != "false")
            .unwrap_or(true);

        let rate_limit_per_sec =
            parsed("RATE_LIMIT_PER_SEC").unwrap_or(defaults.rate_limit_per_sec);

        let rate_limit_burst = lookup("RATE_LIMIT_BURST")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.rate_limit_burst);

        Ok(Self {
            port,
            host,
            challenge,
            sweep_interval_secs,
            body_limit_kb,
            timeout_secs,
            rate_limit_enabled,
            rate_limit_per_sec,
            rate_limit_burst,
        })
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
