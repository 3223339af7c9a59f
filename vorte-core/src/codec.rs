//! Unpadded URL-safe base64 for challenge transport.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Encode bytes as base64url without `=` padding.
///
/// Equivalent to standard base64 with `+` mapped to `-`, `/` mapped to `_`
/// and trailing padding removed.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}
