//! Challenge and transaction identifier generation.
//!
//! Both values come from the operating system CSPRNG. There is no fallback:
//! if the OS cannot provide randomness the issuer fails closed with
//! [`ChallengeError::RandomnessUnavailable`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec;
use crate::error::{ChallengeError, Result};
use crate::rp_id::RpId;

/// Raw challenge length in bytes (256 bits)
pub const CHALLENGE_LEN: usize = 32;

/// Source of cryptographically secure random bytes.
pub trait RandomSource: Send + Sync {
    /// Fill `buf` entirely or fail. Partial fills are never returned.
    fn fill(&self, buf: &mut [u8]) -> Result<()>;
}

/// Operating system CSPRNG via `getrandom`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        getrandom::fill(buf).map_err(|e| ChallengeError::RandomnessUnavailable(e.to_string()))
    }
}

/// 32 raw random bytes bound to a transaction.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge([u8; CHALLENGE_LEN]);

impl Challenge {
    pub fn from_bytes(bytes: [u8; CHALLENGE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHALLENGE_LEN] {
        &self.0
    }

    /// Base64url transport form (43 characters, unpadded).
    pub fn encoded(&self) -> String {
        codec::encode(&self.0)
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Challenge([REDACTED])")
    }
}

/// Opaque transaction identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for TransactionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for TransactionId {
    type Err = ChallengeError;

    /// Unparseable identifiers are reported as not found, since a malformed id
    /// can never have been issued.
    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ChallengeError::TransactionNotFound)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// WebAuthn `userVerification` requirement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    #[default]
    Required,
    Preferred,
    Discouraged,
}

impl UserVerification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Preferred => "preferred",
            Self::Discouraged => "discouraged",
        }
    }
}

impl FromStr for UserVerification {
    type Err = ChallengeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "preferred" => Ok(Self::Preferred),
            "discouraged" => Ok(Self::Discouraged),
            other => Err(ChallengeError::InvalidConfig(format!(
                "unknown user verification policy '{other}'"
            ))),
        }
    }
}

/// Everything produced for one admitted challenge request
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub transaction_id: TransactionId,
    pub challenge: Challenge,
    pub rp_id: RpId,
    pub user_verification: UserVerification,
    pub timeout_ms: u64,
}

/// Generates challenges and transaction identifiers.
#[derive(Clone)]
pub struct ChallengeIssuer {
    random: Arc<dyn RandomSource>,
    user_verification: UserVerification,
    timeout_ms: u64,
}

impl ChallengeIssuer {
    pub fn new(
        random: Arc<dyn RandomSource>,
        user_verification: UserVerification,
        timeout_ms: u64,
    ) -> Self {
        Self {
            random,
            user_verification,
            timeout_ms,
        }
    }

    /// Generate a fresh challenge for `rp_id`.
    ///
    /// Pure with respect to shared state: nothing is recorded here, so a
    /// failure leaves the limiter and the transaction cache untouched.
    pub fn issue(&self, rp_id: RpId) -> Result<IssuedChallenge> {
        let mut id_bytes = [0u8; 16];
        self.random.fill(&mut id_bytes)?;
        let transaction_id =
            TransactionId(uuid::Builder::from_random_bytes(id_bytes).into_uuid());

        let mut challenge = [0u8; CHALLENGE_LEN];
        self.random.fill(&mut challenge)?;

        Ok(IssuedChallenge {
            transaction_id,
            challenge: Challenge(challenge),
            rp_id,
            user_verification: self.user_verification,
            timeout_ms: self.timeout_ms,
        })
    }
}

impl fmt::Debug for ChallengeIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeIssuer")
            .field("user_verification", &self.user_verification)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rp_id::RpIdDeriver;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    struct FailingRandom;

    impl RandomSource for FailingRandom {
        fn fill(&self, _buf: &mut [u8]) -> Result<()> {
            Err(ChallengeError::RandomnessUnavailable("entropy pool closed".into()))
        }
    }

    fn rp_id() -> RpId {
        RpIdDeriver::new(["localhost"], "vorte.app").derive("vorte.app")
    }

    fn issuer() -> ChallengeIssuer {
        ChallengeIssuer::new(Arc::new(OsRandom), UserVerification::Required, 60_000)
    }

    #[test]
    fn test_issue_shape() {
        let issued = issuer().issue(rp_id()).unwrap();

        let encoded = issued.challenge.encoded();
        assert!(!encoded.contains(['+', '/', '=']));
        let decoded = URL_SAFE_NO_PAD.decode(&encoded).unwrap();
        assert_eq!(decoded.len(), CHALLENGE_LEN);
        assert_eq!(decoded.as_slice(), issued.challenge.as_bytes());

        assert_eq!(issued.rp_id.as_str(), "vorte.app");
        assert_eq!(issued.user_verification, UserVerification::Required);
        assert_eq!(issued.timeout_ms, 60_000);
        assert_eq!(issued.transaction_id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_consecutive_issues_differ() {
        let issuer = issuer();
        let a = issuer.issue(rp_id()).unwrap();
        let b = issuer.issue(rp_id()).unwrap();
        assert_ne!(a.challenge, b.challenge);
        assert_ne!(a.transaction_id, b.transaction_id);
    }

    #[test]
    fn test_randomness_failure_is_fatal() {
        let issuer = ChallengeIssuer::new(Arc::new(FailingRandom), UserVerification::Required, 1);
        assert!(matches!(
            issuer.issue(rp_id()),
            Err(ChallengeError::RandomnessUnavailable(_))
        ));
    }

    #[test]
    fn test_transaction_id_parse() {
        let id: TransactionId = "0ff72376-a0b7-4a92-a2e9-a117ef916302".parse().unwrap();
        assert_eq!(id.to_string(), "0ff72376-a0b7-4a92-a2e9-a117ef916302");
        assert_eq!(
            "not-a-uuid".parse::<TransactionId>(),
            Err(ChallengeError::TransactionNotFound)
        );
    }

    #[test]
    fn test_user_verification_serde() {
        assert_eq!(
            serde_json::to_string(&UserVerification::Required).unwrap(),
            "\"required\""
        );
        assert_eq!(
            "Preferred".parse::<UserVerification>().unwrap(),
            UserVerification::Preferred
        );
    }

    #[test]
    fn test_challenge_debug_redacted() {
        let c = Challenge::from_bytes([7; CHALLENGE_LEN]);
        assert_eq!(format!("{c:?}"), "Challenge([REDACTED])");
    }
}
