//! Origin allow-listing for challenge requests.

use std::str::FromStr;

use url::{Origin, Url};

use crate::error::{ChallengeError, Result};

/// What to do with a request that carries no `Origin` header.
///
/// Non-browser clients and same-origin navigations routinely omit the
/// header, so the default admits them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingOriginPolicy {
    #[default]
    Allow,
    Deny,
}

impl FromStr for MissingOriginPolicy {
    type Err = ChallengeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(ChallengeError::InvalidConfig(format!(
                "unknown missing-origin policy '{other}' (expected 'allow' or 'deny')"
            ))),
        }
    }
}

/// Normalize an origin to `scheme://host[:port]`.
///
/// Scheme and host are lowercased, the default port for the scheme is
/// dropped, and any path, query or fragment is discarded. Returns `None`
/// for unparseable or opaque origins such as `null`.
pub fn normalize_origin(origin: &str) -> Option<String> {
    let url = Url::parse(origin.trim()).ok()?;
    match url.origin() {
        tuple @ Origin::Tuple(..) => Some(tuple.ascii_serialization()),
        Origin::Opaque(_) => None,
    }
}

/// Decides whether a declared origin may initiate a challenge.
#[derive(Debug, Clone)]
pub struct OriginGate {
    allowed: Vec<String>,
    missing: MissingOriginPolicy,
}

impl OriginGate {
    /// Build a gate from configured origins.
    ///
    /// Each entry is normalized once here; an entry that does not parse as a
    /// tuple origin is a configuration error.
    pub fn new<I, S>(allowed: I, missing: MissingOriginPolicy) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .map(|entry| {
                let entry = entry.as_ref();
                normalize_origin(entry).ok_or_else(|| {
                    ChallengeError::InvalidConfig(format!("invalid allowed origin '{entry}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { allowed, missing })
    }

    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => self.missing == MissingOriginPolicy::Allow,
            Some(raw) => normalize_origin(raw)
                .map(|normalized| self.allowed.iter().any(|a| *a == normalized))
                .unwrap_or(false),
        }
    }

    pub fn check(&self, origin: Option<&str>) -> Result<()> {
        if self.is_allowed(origin) {
            Ok(())
        } else {
            Err(ChallengeError::OriginNotAllowed)
        }
    }

    /// Normalized allow-list, in configuration order.
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed
    }
}
