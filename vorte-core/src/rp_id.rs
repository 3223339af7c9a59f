//! Relying Party ID derivation.
//!
//! Development hosts keep their own identity so local ceremonies work against
//! their own origin. Every other host collapses to the production apex, so all
//! externally reachable deployments share one relying party.

use std::fmt;

use serde::Serialize;

/// WebAuthn relying-party identifier (never contains a port or path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RpId(String);

impl RpId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps request hosts to RP IDs.
#[derive(Debug, Clone)]
pub struct RpIdDeriver {
    dev_hosts: Vec<String>,
    production_apex: String,
}

impl RpIdDeriver {
    pub fn new<I, S>(dev_hosts: I, production_apex: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            dev_hosts: dev_hosts
                .into_iter()
                .map(|h| clean_host(h.as_ref()))
                .collect(),
            production_apex: clean_host(&production_apex.into()),
        }
    }

    /// Derive the RP ID for a `Host` header value (port allowed).
    pub fn derive(&self, host: &str) -> RpId {
        let host = clean_host(host);
        if self.dev_hosts.iter().any(|dev| *dev == host) {
            RpId(host)
        } else {
            RpId(self.production_apex.clone())
        }
    }
}

/// Strip a trailing `:port`, IPv6 brackets and a root dot, then lowercase.
fn clean_host(host: &str) -> String {
    let host = host.trim();
    let host = match host.rsplit_once(':') {
        Some((name, port))
            if !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && (name.ends_with(']') || !name.contains(':')) =>
        {
            name
        }
        _ => host,
    };
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    host.trim_end_matches('.').to_ascii_lowercase()
}
