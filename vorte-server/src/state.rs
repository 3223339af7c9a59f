//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use vorte_core::{ChallengeError, ChallengeService};

use crate::config::Config;
use crate::handlers::register::{CredentialVerifier, UnconfiguredVerifier};

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Challenge issuance, rate limiting and transaction storage
    pub service: Arc<ChallengeService>,
    /// Attestation check run on registration completion
    pub verifier: Arc<dyn CredentialVerifier>,
}

impl AppState {
    pub fn new(service: Arc<ChallengeService>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { service, verifier }
    }

    /// State backed by the system clock, the OS CSPRNG and no verifier.
    pub fn from_config(config: &Config) -> Result<Self, ChallengeError> {
        let service = ChallengeService::with_defaults(config.challenge.clone())?;
        Ok(Self::new(Arc::new(service), Arc::new(UnconfiguredVerifier)))
    }
}

/// Periodically drop lapsed rate-limit windows and expired transactions.
pub fn spawn_sweeper(service: Arc<ChallengeService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let stats = service.sweep();
            tracing::debug!(
                rate_limit_entries = stats.rate_limit_entries,
                pending_transactions = stats.pending_transactions,
                "Periodic sweep complete"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vorte_core::{ChallengeConfig, ChallengeRequest, ManualClock, OsRandom};

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_drops_lapsed_windows() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let service = Arc::new(
            ChallengeService::new(ChallengeConfig::default(), clock.clone(), Arc::new(OsRandom))
                .unwrap(),
        );
        service
            .request_challenge(ChallengeRequest {
                origin: None,
                fingerprint: Some("0123456789abcdef0123456789abcdef"),
                host: "vorte.app",
            })
            .unwrap();
        assert_eq!(service.stats().rate_limit_entries, 1);

        let handle = spawn_sweeper(service.clone(), Duration::from_secs(60));
        clock.advance(Duration::from_secs(61));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(service.stats().rate_limit_entries, 0);
        assert_eq!(service.stats().pending_transactions, 1);
        handle.abort();
    }
}
