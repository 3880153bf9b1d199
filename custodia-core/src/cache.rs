//! Time-boxed memoization of trust verdicts.
//!
//! Registry lookups are the only network calls in the trust pipeline, so
//! the resolver keeps a bounded cache of verdicts in front of them. An
//! entry is never served past its expiry, and the cache never grows past
//! its capacity: inserting into a full cache evicts the single oldest
//! entry (linear scan — working sets are expected to stay small).
//!
//! The cache is plain data. It takes `now` as an argument rather than
//! holding a clock, and the owning resolver decides when "now" is.

use crate::identity::Address;
use crate::trust::TrustVerdict;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A cached verdict with its validity window.
///
/// Invariant: `expires_at = stored_at + ttl` at insertion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub subject: Address,
    pub verdict: TrustVerdict,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Bounded TTL cache keyed by normalized subject identity.
#[derive(Debug, Clone)]
pub struct VerdictCache {
    entries: HashMap<Address, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl VerdictCache {
    /// Create a cache holding at most `capacity` entries, each valid for
    /// `ttl` after insertion.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Look up an unexpired verdict. An expired entry is evicted and `None`
    /// is returned.
    pub fn get(&mut self, subject: &Address, now: DateTime<Utc>) -> Option<TrustVerdict> {
        match self.entries.get(subject) {
            Some(entry) if now < entry.expires_at => Some(entry.verdict.clone()),
            Some(_) => {
                self.entries.remove(subject);
                None
            }
            None => None,
        }
    }

    /// Store a verdict, stamped `now`, valid until `now + ttl`.
    ///
    /// When the cache is full and the subject is not already present, the
    /// entry with the oldest `stored_at` is evicted first.
    pub fn set(&mut self, verdict: TrustVerdict, now: DateTime<Utc>) {
        let subject = verdict.subject;
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&subject) {
            let oldest = self
                .entries
                .values()
                .min_by_key(|e| (e.stored_at, e.subject))
                .map(|e| e.subject);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            subject,
            CacheEntry {
                subject,
                verdict,
                stored_at: now,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drop one subject's entry, if present.
    ///
    /// Callers must invalidate after any action that could change a
    /// subject's trust facts.
    pub fn invalidate(&mut self, subject: &Address) {
        self.entries.remove(subject);
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all entries, ordered by insertion time.
    pub fn export_state(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by_key(|e| (e.stored_at, e.subject));
        entries
    }

    /// Replace the cache contents with previously exported entries.
    pub fn import_state(&mut self, entries: Vec<CacheEntry>) {
        self.entries = entries.into_iter().map(|e| (e.subject, e)).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::TrustVerdict;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from_bytes(bytes)
    }

    fn verdict(subject: Address) -> TrustVerdict {
        TrustVerdict {
            subject,
            is_trusted: true,
            identity: None,
            reputation: None,
            validations: None,
            reasons: vec!["test".to_string()],
        }
    }

    #[test]
    fn serves_until_expiry_then_evicts() {
        let mut cache = VerdictCache::new(Duration::minutes(5), 16);
        let now = Utc::now();
        cache.set(verdict(addr(1)), now);

        assert!(cache.get(&addr(1), now + Duration::minutes(4)).is_some());
        assert!(cache.get(&addr(1), now + Duration::minutes(5)).is_none());
        // Expired entry was evicted, not just hidden.
        assert!(cache.is_empty());
    }

    #[test]
    fn full_cache_evicts_oldest() {
        let mut cache = VerdictCache::new(Duration::minutes(5), 2);
        let now = Utc::now();
        cache.set(verdict(addr(1)), now);
        cache.set(verdict(addr(2)), now + Duration::seconds(1));
        cache.set(verdict(addr(3)), now + Duration::seconds(2));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&addr(1), now + Duration::seconds(3)).is_none());
        assert!(cache.get(&addr(2), now + Duration::seconds(3)).is_some());
        assert!(cache.get(&addr(3), now + Duration::seconds(3)).is_some());
    }

    #[test]
    fn overwriting_does_not_evict_others() {
        let mut cache = VerdictCache::new(Duration::minutes(5), 2);
        let now = Utc::now();
        cache.set(verdict(addr(1)), now);
        cache.set(verdict(addr(2)), now);
        cache.set(verdict(addr(2)), now + Duration::seconds(1));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&addr(1), now + Duration::seconds(2)).is_some());
    }

    #[test]
    fn invalidate_and_clear() {
        let mut cache = VerdictCache::new(Duration::minutes(5), 16);
        let now = Utc::now();
        cache.set(verdict(addr(1)), now);
        cache.set(verdict(addr(2)), now);

        cache.invalidate(&addr(1));
        assert!(cache.get(&addr(1), now).is_none());
        assert!(cache.get(&addr(2), now).is_some());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn export_import_round_trips() {
        let mut cache = VerdictCache::new(Duration::minutes(5), 16);
        let now = Utc::now();
        cache.set(verdict(addr(1)), now);
        cache.set(verdict(addr(2)), now + Duration::seconds(1));

        let exported = cache.export_state();
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[0].subject, addr(1));

        let mut restored = VerdictCache::new(Duration::minutes(5), 16);
        restored.import_state(exported.clone());
        assert_eq!(restored.export_state(), exported);
    }
}
