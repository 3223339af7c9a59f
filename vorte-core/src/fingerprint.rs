//! Client fingerprint validation.

use std::fmt;

use crate::error::{ChallengeError, Result};

/// Number of hex characters in a fingerprint (128 bits)
pub const FINGERPRINT_LEN: usize = 32;

/// Validated, lowercase client fingerprint.
///
/// Only ever used as a rate-limit key component. Case is normalized so that
/// `ABCD...` and `abcd...` share one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Validate a raw `X-Fingerprint` header value.
    ///
    /// Fails with [`ChallengeError::InvalidFingerprint`] when the header is
    /// absent, empty after trimming, or not exactly 32 hex characters.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let value = raw.map(str::trim).unwrap_or_default();

        let mut raw_bytes = [0u8; FINGERPRINT_LEN / 2];
        if value.len() != FINGERPRINT_LEN
            || hex::decode_to_slice(value, &mut raw_bytes).is_err()
        {
            return Err(ChallengeError::InvalidFingerprint);
        }

        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix safe to put in logs.
    pub fn redacted(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
