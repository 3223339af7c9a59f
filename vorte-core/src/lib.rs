//! Vorte Core - WebAuthn challenge issuance
//!
//! Issues single-use challenges for Vorte's passkey ceremonies:
//!
//! - **Origin gate**: only allow-listed browser origins may request a challenge
//! - **Fingerprint**: a 32-hex-character client token keys the rate limiter
//! - **RP ID**: derived from the request host (dev hosts map to themselves)
//! - **Rate limiter**: one challenge per (RP ID, fingerprint) per window
//! - **Transaction cache**: binds each challenge to a UUID until completion
//!
//! # Example
//!
//! ```no_run
//! use vorte_core::{ChallengeConfig, ChallengeRequest, ChallengeService};
//!
//! let service = ChallengeService::with_defaults(ChallengeConfig::default())?;
//! let grant = service.request_challenge(ChallengeRequest {
//!     origin: Some("https://vorte.app"),
//!     fingerprint: Some("0123456789abcdef0123456789abcdef"),
//!     host: "vorte.app",
//! })?;
//!
//! let id = grant.issued.transaction_id.to_string();
//! let transaction = service.complete_registration(&id)?;
//! assert_eq!(transaction.challenge, grant.issued.challenge);
//! # Ok::<(), vorte_core::ChallengeError>(())
//! ```

pub mod challenge;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod origin;
pub mod rate_limit;
pub mod rp_id;
pub mod service;
pub mod transaction;

pub use challenge::{
    Challenge, ChallengeIssuer, IssuedChallenge, OsRandom, RandomSource, TransactionId,
    UserVerification, CHALLENGE_LEN,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ChallengeConfig;
pub use error::{ChallengeError, Result};
pub use fingerprint::{Fingerprint, FINGERPRINT_LEN};
pub use origin::{normalize_origin, MissingOriginPolicy, OriginGate};
pub use rate_limit::{Admission, RateLimitKey, RateLimiter};
pub use rp_id::{RpId, RpIdDeriver};
pub use service::{ChallengeGrant, ChallengeRequest, ChallengeService, ServiceStats};
pub use transaction::{Transaction, TransactionCache};
