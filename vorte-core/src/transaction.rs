//! In-memory transaction cache
//!
//! Binds an issued challenge to its transaction identifier until the
//! registration/assertion completion step consumes it. Entries are single-use
//! (`take` removes them) and expire after a fixed horizon even if never
//! consumed.
//!
//! # Capacity
//!
//! A put at capacity sweeps expired entries, but only once the earliest
//! expiry watermark has passed. If the cache is still full it evicts a batch
//! of the oldest pending transactions (a sixteenth of the capacity, or the
//! current overshoot if larger), so the age scan runs once per batch rather
//! than once per put.
//!
//! The bound is best-effort. The length check and the insert are separate
//! steps, so concurrent puts can overshoot `capacity` by at most the number
//! of puts in flight. The next put at capacity evicts the overshoot.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use crate::challenge::{Challenge, IssuedChallenge, TransactionId};
use crate::clock::duration_ms;
use crate::error::{ChallengeError, Result};
use crate::rp_id::RpId;

const EVICTION_BATCH_DIVISOR: usize = 16;

/// A pending transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub challenge: Challenge,
    pub rp_id: RpId,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
}

impl Transaction {
    /// Build the cache record for an issued challenge.
    pub fn from_issued(issued: &IssuedChallenge, now_ms: u64, ttl: Duration) -> Self {
        Self {
            transaction_id: issued.transaction_id,
            challenge: issued.challenge.clone(),
            rp_id: issued.rp_id.clone(),
            created_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(duration_ms(ttl)),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// Thread-safe transaction cache
pub struct TransactionCache {
    /// Pending transactions (transaction_id -> transaction)
    entries: DashMap<TransactionId, Transaction>,
    capacity: usize,
    /// At or below the earliest expiry in `entries`
    soonest_expiry_ms: AtomicU64,
}

impl TransactionCache {
    /// Create a new cache holding at most `capacity` transactions
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity.min(1024)),
            capacity,
            soonest_expiry_ms: AtomicU64::new(u64::MAX),
        }
    }

    /// Store a transaction, overwriting any entry with the same identifier.
    ///
    /// Returns `true` if an entry was overwritten. With 122 random bits per
    /// identifier that only happens under a broken randomness source, so it is
    /// logged as an error but never fails the request.
    pub fn put(&self, transaction: Transaction) -> bool {
        let now_ms = transaction.created_at_ms;
        if self.entries.len() >= self.capacity {
            self.make_room(now_ms);
        }

        let transaction_id = transaction.transaction_id;
        self.soonest_expiry_ms.fetch_min(transaction.expires_at_ms, Ordering::Relaxed);
        let collided = self.entries.insert(transaction_id, transaction).is_some();
        if collided {
            tracing::error!(
                transaction_id = %transaction_id,
                "Transaction identifier collision, previous entry overwritten"
            );
        }
        collided
    }

    /// Look up a transaction without consuming it.
    pub fn get(&self, transaction_id: &TransactionId, now_ms: u64) -> Result<Transaction> {
        self.entries
            .get(transaction_id)
            .filter(|entry| !entry.is_expired(now_ms))
            .map(|entry| entry.value().clone())
            .ok_or(ChallengeError::TransactionNotFound)
    }

    /// Retrieve and remove a transaction.
    ///
    /// The removal is atomic, so concurrent completions for one identifier
    /// see it exactly once. Expired entries are removed and reported as not
    /// found.
    pub fn take(&self, transaction_id: &TransactionId, now_ms: u64) -> Result<Transaction> {
        let (_, transaction) = self
            .entries
            .remove(transaction_id)
            .ok_or(ChallengeError::TransactionNotFound)?;

        if transaction.is_expired(now_ms) {
            tracing::debug!(transaction_id = %transaction_id, "Transaction expired before use");
            return Err(ChallengeError::TransactionNotFound);
        }
        Ok(transaction)
    }

    /// Remove expired transactions. Returns how many were removed.
    pub fn cleanup_expired(&self, now_ms: u64) -> usize {
        let before = self.entries.len();
        let mut soonest = u64::MAX;
        self.entries.retain(|_, entry| {
            let live = !entry.is_expired(now_ms);
            if live {
                soonest = soonest.min(entry.expires_at_ms);
            }
            live
        });
        self.soonest_expiry_ms.store(soonest, Ordering::Relaxed);
        before.saturating_sub(self.entries.len())
    }

    /// Sweep if anything may have expired, then evict the oldest entries if
    /// there is still no room for one more.
    fn make_room(&self, now_ms: u64) {
        if now_ms >= self.soonest_expiry_ms.load(Ordering::Relaxed) {
            self.cleanup_expired(now_ms);
        }

        let len = self.entries.len();
        if len < self.capacity {
            return;
        }

        let batch = (len - self.capacity + 1)
            .max(self.capacity / EVICTION_BATCH_DIVISOR)
            .max(1);
        let mut by_age: Vec<(u64, TransactionId)> = self
            .entries
            .iter()
            .map(|entry| (entry.created_at_ms, *entry.key()))
            .collect();
        if by_age.len() > batch {
            by_age.select_nth_unstable_by_key(batch - 1, |(created_at_ms, _)| *created_at_ms);
            by_age.truncate(batch);
        }

        // Another thread may have taken some already; either way there is room
        let evicted = by_age
            .iter()
            .filter(|(_, transaction_id)| self.entries.remove(transaction_id).is_some())
            .count();
        tracing::warn!(
            evicted,
            capacity = self.capacity,
            "Transaction cache full, evicted oldest pending transactions"
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for TransactionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCache")
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
