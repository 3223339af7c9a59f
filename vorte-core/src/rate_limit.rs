//! Fixed-window limiter: one challenge per (RP ID, fingerprint) per window.
//!
//! # Concurrency
//!
//! The expiry check and the expiry write for a key happen inside one
//! `DashMap::entry` call, which holds the shard's write lock for its whole
//! duration. Two simultaneous requests for the same key therefore serialize
//! and only the first one is admitted.
//!
//! # Memory
//!
//! Lapsed entries are inert but stay in the map until `cleanup_expired` runs or
//! the same key is admitted again. The map is capped at `capacity` keys; a new
//! key arriving at capacity triggers a sweep, and if the map is still full the
//! new key is refused. Hot entries are never evicted since that would reopen
//! their window.
//!
//! The limiter keeps a watermark at or below the earliest expiry in the map.
//! While the clock is before the watermark nothing can have lapsed, so a full
//! limiter refuses new keys from the watermark alone without sweeping. A
//! sweep runs at most once per watermark and recomputes it.
//!
//! The capacity is best-effort. The length check and the insert are separate
//! steps, so concurrent admissions of distinct new keys can overshoot
//! `capacity` by at most the number of admissions in flight.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clock::duration_ms;
use crate::fingerprint::Fingerprint;
use crate::rp_id::RpId;

/// Composite limiter key. Stored structurally, so no delimiter can collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    rp_id: RpId,
    fingerprint: Fingerprint,
}

impl RateLimitKey {
    pub fn new(rp_id: RpId, fingerprint: Fingerprint) -> Self {
        Self { rp_id, fingerprint }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.rp_id, self.fingerprint.redacted())
    }
}

/// Outcome of an admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; the key stays hot until `expires_at_ms`
    Admitted { expires_at_ms: u64 },
    /// Refused; the caller may retry after this many seconds (always >= 1)
    Rejected { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// In-memory fixed-window rate limiter
pub struct RateLimiter {
    /// key -> expiry (epoch ms)
    entries: DashMap<RateLimitKey, u64>,
    capacity: usize,
    /// At or below the earliest expiry in `entries`; `u64::MAX` when unknown
    soonest_expiry_ms: AtomicU64,
    sweeps: AtomicUsize,
}

impl RateLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity.min(1024)),
            capacity,
            soonest_expiry_ms: AtomicU64::new(u64::MAX),
            sweeps: AtomicUsize::new(0),
        }
    }

    /// Admit `key` at `now_ms` unless it is still hot.
    ///
    /// On admission the key's expiry is set to `now_ms + window`, overwriting
    /// any lapsed entry.
    pub fn admit(&self, key: &RateLimitKey, now_ms: u64, window: Duration) -> Admission {
        if let Some(rejection) = self.shed_if_full(key, now_ms) {
            return rejection;
        }

        let expires_at_ms = now_ms.saturating_add(duration_ms(window));

        // Entry holds the shard lock across the read and the write
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let current = *entry.get();
                if current > now_ms {
                    return Admission::Rejected {
                        retry_after_secs: retry_after_secs(current, now_ms),
                    };
                }
                entry.insert(expires_at_ms);
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at_ms);
            }
        }
        self.soonest_expiry_ms.fetch_min(expires_at_ms, Ordering::Relaxed);

        Admission::Admitted { expires_at_ms }
    }

    /// Refuse a new key when the map is full of hot entries.
    fn shed_if_full(&self, key: &RateLimitKey, now_ms: u64) -> Option<Admission> {
        if self.entries.len() < self.capacity || self.entries.contains_key(key) {
            return None;
        }

        let soonest = self.soonest_expiry_ms.load(Ordering::Relaxed);
        if soonest != u64::MAX && now_ms < soonest {
            // Nothing has lapsed since the last sweep
            tracing::debug!(key = %key, "Rate limiter full, refusing new key");
            return Some(Admission::Rejected {
                retry_after_secs: retry_after_secs(soonest, now_ms),
            });
        }

        let removed = self.cleanup_expired(now_ms);
        if self.entries.len() < self.capacity {
            tracing::debug!(removed, "Rate limiter swept at capacity");
            return None;
        }

        let soonest = self.soonest_expiry_ms.load(Ordering::Relaxed);
        tracing::warn!(
            capacity = self.capacity,
            key = %key,
            "Rate limiter full of active windows, refusing new key"
        );

        Some(Admission::Rejected {
            retry_after_secs: retry_after_secs(soonest, now_ms),
        })
    }

    /// Remove every lapsed entry and reset the expiry watermark. Returns how
    /// many were removed.
    ///
    /// An admission racing with the sweep can leave the watermark late; the
    /// next sweep corrects it.
    pub fn cleanup_expired(&self, now_ms: u64) -> usize {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        let before = self.entries.len();
        let mut soonest = u64::MAX;
        self.entries.retain(|_, expires_at| {
            let live = *expires_at > now_ms;
            if live {
                soonest = soonest.min(*expires_at);
            }
            live
        });
        self.soonest_expiry_ms.store(soonest, Ordering::Relaxed);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("sweeps", &self.sweeps.load(Ordering::Relaxed))
            .finish()
    }
}

/// Whole seconds until `expires_at_ms`, rounded up and floored at 1.
fn retry_after_secs(expires_at_ms: u64, now_ms: u64) -> u64 {
    expires_at_ms.saturating_sub(now_ms).div_ceil(1000).max(1)
}
