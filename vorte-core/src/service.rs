//! Challenge issuance pipeline.
//!
//! Order of operations for a challenge request:
//!
//! 1. origin gate
//! 2. fingerprint validation
//! 3. RP ID derivation
//! 4. challenge + transaction id generation (no shared state touched)
//! 5. rate-limit admission
//! 6. transaction cache insert
//!
//! Every failure before step 5 leaves both stores untouched, so invalid
//! requests never consume rate-limit budget and a randomness failure never
//! burns a window.

use std::sync::Arc;

use crate::challenge::{ChallengeIssuer, IssuedChallenge, OsRandom, RandomSource, TransactionId};
use crate::clock::{Clock, SystemClock};
use crate::config::ChallengeConfig;
use crate::error::{ChallengeError, Result};
use crate::fingerprint::Fingerprint;
use crate::origin::OriginGate;
use crate::rate_limit::{Admission, RateLimitKey, RateLimiter};
use crate::rp_id::RpIdDeriver;
use crate::transaction::{Transaction, TransactionCache};

/// Raw inputs of a challenge request, as lifted from HTTP headers
#[derive(Debug, Clone, Copy, Default)]
pub struct ChallengeRequest<'a> {
    /// `Origin` header, if any
    pub origin: Option<&'a str>,
    /// `X-Fingerprint` header, if any
    pub fingerprint: Option<&'a str>,
    /// Request host (may include a port)
    pub host: &'a str,
}

/// A successfully issued challenge
#[derive(Debug, Clone)]
pub struct ChallengeGrant {
    pub issued: IssuedChallenge,
    /// Length of the rate-limit window just opened, in seconds
    pub window_secs: u64,
}

/// Occupancy of the shared stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStats {
    pub rate_limit_entries: usize,
    pub pending_transactions: usize,
}

/// Entry point for the challenge and registration-completion flows.
pub struct ChallengeService {
    config: ChallengeConfig,
    origin_gate: OriginGate,
    rp_ids: RpIdDeriver,
    issuer: ChallengeIssuer,
    limiter: RateLimiter,
    transactions: TransactionCache,
    clock: Arc<dyn Clock>,
}

impl ChallengeService {
    pub fn new(
        config: ChallengeConfig,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> Result<Self> {
        config.validate()?;

        let origin_gate = OriginGate::new(&config.allowed_origins, config.missing_origin)?;
        let rp_ids = RpIdDeriver::new(&config.dev_hosts, config.production_apex.clone());
        let issuer = ChallengeIssuer::new(random, config.user_verification, config.timeout_ms);
        let limiter = RateLimiter::new(config.rate_limit_capacity);
        let transactions = TransactionCache::new(config.transaction_capacity);

        Ok(Self {
            config,
            origin_gate,
            rp_ids,
            issuer,
            limiter,
            transactions,
            clock,
        })
    }

    /// Service backed by the system clock and the OS CSPRNG.
    pub fn with_defaults(config: ChallengeConfig) -> Result<Self> {
        Self::new(config, Arc::new(SystemClock), Arc::new(OsRandom))
    }

    /// Issue a challenge, subject to origin, fingerprint and rate-limit checks.
    pub fn request_challenge(&self, request: ChallengeRequest<'_>) -> Result<ChallengeGrant> {
        self.origin_gate.check(request.origin).inspect_err(|_| {
            tracing::warn!(origin = ?request.origin, "Challenge refused: origin not allowed");
        })?;

        let fingerprint = Fingerprint::parse(request.fingerprint)?;
        let rp_id = self.rp_ids.derive(request.host);

        let issued = self.issuer.issue(rp_id.clone()).inspect_err(|e| {
            tracing::error!(error = %e, "Challenge generation failed, refusing to issue");
        })?;

        let key = RateLimitKey::new(rp_id, fingerprint);
        let now_ms = self.clock.now_ms();

        match self.limiter.admit(&key, now_ms, self.config.window) {
            Admission::Admitted { .. } => {}
            Admission::Rejected { retry_after_secs } => {
                tracing::info!(key = %key, retry_after_secs, "Challenge rate limited");
                return Err(ChallengeError::RateLimited {
                    retry_after_secs,
                    window_secs: self.config.window_secs(),
                });
            }
        }

        self.transactions.put(Transaction::from_issued(
            &issued,
            now_ms,
            self.config.transaction_ttl,
        ));

        tracing::info!(
            transaction_id = %issued.transaction_id,
            rp_id = %issued.rp_id,
            "Challenge issued"
        );

        Ok(ChallengeGrant {
            issued,
            window_secs: self.config.window_secs(),
        })
    }

    /// Consume the transaction referenced by a completion request.
    ///
    /// Malformed, unknown, expired and already-consumed identifiers are all
    /// reported as [`ChallengeError::TransactionNotFound`].
    pub fn complete_registration(&self, transaction_id: &str) -> Result<Transaction> {
        let id: TransactionId = transaction_id.parse()?;
        self.transactions
            .take(&id, self.clock.now_ms())
            .inspect_err(|_| {
                tracing::warn!(
                    transaction_id = %id,
                    "Completion for unknown transaction (expired, reused or forged)"
                );
            })
    }

    /// Non-consuming lookup of a pending transaction.
    pub fn lookup_transaction(&self, transaction_id: &TransactionId) -> Result<Transaction> {
        self.transactions.get(transaction_id, self.clock.now_ms())
    }

    /// Drop lapsed rate-limit windows and expired transactions.
    pub fn sweep(&self) -> ServiceStats {
        let now_ms = self.clock.now_ms();
        let windows = self.limiter.cleanup_expired(now_ms);
        let transactions = self.transactions.cleanup_expired(now_ms);
        if windows > 0 || transactions > 0 {
            tracing::debug!(windows, transactions, "Swept expired challenge state");
        }
        self.stats()
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            rate_limit_entries: self.limiter.len(),
            pending_transactions: self.transactions.len(),
        }
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    pub fn origin_gate(&self) -> &OriginGate {
        &self.origin_gate
    }
}

impl std::fmt::Debug for ChallengeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeService")
            .field("limiter", &self.limiter)
            .field("transactions", &self.transactions)
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::origin::MissingOriginPolicy;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    const FP: &str = "0123456789abcdef0123456789abcdef";
    const T0: u64 = 1_700_000_000_000;

    /// OS randomness that counts calls and can be switched off
    #[derive(Default)]
    struct CountingRandom {
        calls: AtomicUsize,
        broken: std::sync::atomic::AtomicBool,
    }

    impl RandomSource for CountingRandom {
        fn fill(&self, buf: &mut [u8]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken.load(Ordering::SeqCst) {
                return Err(ChallengeError::RandomnessUnavailable("disabled".into()));
            }
            OsRandom.fill(buf)
        }
    }

    fn service_with(
        config: ChallengeConfig,
    ) -> (ChallengeService, Arc<ManualClock>, Arc<CountingRandom>) {
        let clock = Arc::new(ManualClock::new(T0));
        let random = Arc::new(CountingRandom::default());
        let service = ChallengeService::new(config, clock.clone(), random.clone()).unwrap();
        (service, clock, random)
    }

    fn service() -> (ChallengeService, Arc<ManualClock>, Arc<CountingRandom>) {
        service_with(ChallengeConfig::default())
    }

    fn request(fingerprint: Option<&str>) -> ChallengeRequest<'_> {
        ChallengeRequest {
            origin: Some("https://vorte.app"),
            fingerprint,
            host: "vorte.app",
        }
    }

    #[test]
    fn test_first_request_succeeds_second_is_limited() {
        let (service, clock, _) = service();

        let grant = service.request_challenge(request(Some(FP))).unwrap();
        assert_eq!(grant.window_secs, 60);
        assert_eq!(grant.issued.rp_id.as_str(), "vorte.app");

        clock.advance(Duration::from_secs(10));
        match service.request_challenge(request(Some(FP))) {
            Err(ChallengeError::RateLimited {
                retry_after_secs,
                window_secs,
            }) => {
                assert!((1..=60).contains(&retry_after_secs));
                assert_eq!(retry_after_secs, 50);
                assert_eq!(window_secs, 60);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn test_rate_limit_reports_configured_window() {
        let (service, clock, _) = service_with(ChallengeConfig {
            window: Duration::from_secs(30),
            ..Default::default()
        });
        service.request_challenge(request(Some(FP))).unwrap();

        clock.advance(Duration::from_secs(12));
        assert_eq!(
            service.request_challenge(request(Some(FP))).unwrap_err(),
            ChallengeError::RateLimited {
                retry_after_secs: 18,
                window_secs: 30,
            }
        );
    }

    #[test]
    fn test_new_window_after_lapse() {
        let (service, clock, _) = service();
        let first = service.request_challenge(request(Some(FP))).unwrap();

        clock.advance(Duration::from_secs(60));
        let second = service.request_challenge(request(Some(FP))).unwrap();
        assert_ne!(first.issued.transaction_id, second.issued.transaction_id);

        // the new window is enforced again
        assert!(service.request_challenge(request(Some(FP))).is_err());
    }

    #[test]
    fn test_case_variants_share_a_bucket() {
        let (service, _, _) = service();
        service.request_challenge(request(Some(FP))).unwrap();
        let upper = FP.to_ascii_uppercase();
        assert!(matches!(
            service.request_challenge(request(Some(upper.as_str()))),
            Err(ChallengeError::RateLimited { .. })
        ));
    }

    #[test]
    fn test_invalid_fingerprint_never_touches_state() {
        let (service, _, random) = service();

        for fp in [None, Some("not-32-hex-chars"), Some("")] {
            assert_eq!(
                service.request_challenge(request(fp)).unwrap_err(),
                ChallengeError::InvalidFingerprint
            );
        }
        assert_eq!(
            service.stats(),
            ServiceStats {
                rate_limit_entries: 0,
                pending_transactions: 0
            }
        );
        assert_eq!(random.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disallowed_origin_checked_first() {
        let (service, _, _) = service();
        let req = ChallengeRequest {
            origin: Some("https://evil.com"),
            fingerprint: None,
            host: "vorte.app",
        };
        assert_eq!(
            service.request_challenge(req).unwrap_err(),
            ChallengeError::OriginNotAllowed
        );
        assert_eq!(service.stats().rate_limit_entries, 0);
    }

    #[test]
    fn test_missing_origin_follows_policy() {
        let req = ChallengeRequest {
            origin: None,
            fingerprint: Some(FP),
            host: "vorte.app",
        };

        let (permissive, _, _) = service();
        assert!(permissive.request_challenge(req).is_ok());

        let (strict, _, _) = service_with(ChallengeConfig {
            missing_origin: MissingOriginPolicy::Deny,
            ..Default::default()
        });
        assert_eq!(
            strict.request_challenge(req).unwrap_err(),
            ChallengeError::OriginNotAllowed
        );
    }

    #[test]
    fn test_randomness_failure_leaves_no_state() {
        let (service, _, random) = service();
        random.broken.store(true, Ordering::SeqCst);

        assert!(matches!(
            service.request_challenge(request(Some(FP))),
            Err(ChallengeError::RandomnessUnavailable(_))
        ));
        assert_eq!(service.stats().rate_limit_entries, 0);
        assert_eq!(service.stats().pending_transactions, 0);

        // the fingerprint still has its full budget once randomness returns
        random.broken.store(false, Ordering::SeqCst);
        assert!(service.request_challenge(request(Some(FP))).is_ok());
    }

    #[test]
    fn test_completion_returns_issued_challenge_once() {
        let (service, _, _) = service();
        let grant = service.request_challenge(request(Some(FP))).unwrap();
        let id = grant.issued.transaction_id.to_string();

        let tx = service.complete_registration(&id).unwrap();
        assert_eq!(tx.challenge, grant.issued.challenge);
        assert_eq!(tx.challenge.encoded(), grant.issued.challenge.encoded());
        assert_eq!(
            URL_SAFE_NO_PAD.decode(tx.challenge.encoded()).unwrap().len(),
            32
        );
        assert_eq!(tx.rp_id.as_str(), "vorte.app");

        assert_eq!(
            service.complete_registration(&id).unwrap_err(),
            ChallengeError::TransactionNotFound
        );
    }

    #[test]
    fn test_completion_for_unknown_or_malformed_id() {
        let (service, _, _) = service();
        assert_eq!(
            service
                .complete_registration("0ff72376-a0b7-4a92-a2e9-a117ef916302")
                .unwrap_err(),
            ChallengeError::TransactionNotFound
        );
        assert_eq!(
            service.complete_registration("garbage").unwrap_err(),
            ChallengeError::TransactionNotFound
        );
    }

    #[test]
    fn test_completion_after_ttl_fails() {
        let (service, clock, _) = service();
        let grant = service.request_challenge(request(Some(FP))).unwrap();
        assert!(service
            .lookup_transaction(&grant.issued.transaction_id)
            .is_ok());

        clock.advance(Duration::from_secs(300));
        assert_eq!(
            service
                .complete_registration(&grant.issued.transaction_id.to_string())
                .unwrap_err(),
            ChallengeError::TransactionNotFound
        );
    }

    #[test]
    fn test_sweep_bounds_state() {
        let (service, clock, _) = service();
        for i in 0..5u32 {
            let fp = format!("{i:032x}");
            service.request_challenge(request(Some(fp.as_str()))).unwrap();
        }
        assert_eq!(service.stats().rate_limit_entries, 5);

        clock.advance(Duration::from_secs(61));
        let stats = service.sweep();
        assert_eq!(stats.rate_limit_entries, 0);
        assert_eq!(stats.pending_transactions, 5);

        clock.advance(Duration::from_secs(300));
        assert_eq!(service.sweep().pending_transactions, 0);
    }

    #[test]
    fn test_dev_host_has_own_bucket() {
        let (service, _, _) = service();
        service.request_challenge(request(Some(FP))).unwrap();

        let local = ChallengeRequest {
            origin: Some("http://localhost:8787"),
            fingerprint: Some(FP),
            host: "localhost:8787",
        };
        let grant = service.request_challenge(local).unwrap();
        assert_eq!(grant.issued.rp_id.as_str(), "localhost");
    }

    #[test]
    fn test_concurrent_same_fingerprint_single_admission() {
        let (service, _, _) = service();
        let threads = 24;
        let barrier = Barrier::new(threads);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        service.request_challenge(request(Some(FP)))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, ChallengeError::RateLimited { .. })));
        assert_eq!(service.stats().pending_transactions, 1);
    }

    #[test]
    fn test_concurrent_distinct_fingerprints_all_admitted() {
        let (service, _, _) = service();
        let threads = 24;
        let barrier = Barrier::new(threads);

        let admitted = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|i| {
                    let service = &service;
                    let barrier = &barrier;
                    s.spawn(move || {
                        let fp = format!("{:032x}", 1000 + i);
                        barrier.wait();
                        service.request_challenge(request(Some(fp.as_str()))).is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(admitted, threads);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ChallengeConfig {
            allowed_origins: vec!["::not an origin::".into()],
            ..Default::default()
        };
        assert!(matches!(
            ChallengeService::with_defaults(config),
            Err(ChallengeError::InvalidConfig(_))
        ));
    }
}
