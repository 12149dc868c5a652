//! Thread-safe correlation table.

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::domain::CorrelationKey;

/// When correlations are removed.
///
/// Without a policy entries live until the process exits, and the key space
/// is 2^32, so a long-running relay should set at least one bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvictionPolicy {
    /// Age after which an entry is considered stale
    pub ttl: Option<Duration>,
    /// Maximum number of live entries
    pub max_entries: Option<usize>,
}

impl EvictionPolicy {
    /// Never evict anything.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    sender: Ipv4Addr,
    inserted_at: Instant,
}

/// Order records are compacted once they outnumber live entries this much
const ORDER_SLACK: usize = 2;
/// Below this many records compaction is not worth it
const ORDER_COMPACT_MIN: usize = 64;

/// The map plus the order its entries were written in.
///
/// Overwriting a key leaves its older record in `order` behind. Such a
/// record no longer matches the map entry's timestamp and is skipped.
#[derive(Debug, Default)]
struct Entries {
    map: HashMap<CorrelationKey, Entry>,
    order: VecDeque<(CorrelationKey, Instant)>,
}

impl Entries {
    fn is_current(&self, key: &CorrelationKey, inserted_at: Instant) -> bool {
        self.map
            .get(key)
            .is_some_and(|entry| entry.inserted_at == inserted_at)
    }

    /// Remove the oldest live entry.
    fn pop_oldest(&mut self) {
        while let Some((key, inserted_at)) = self.order.pop_front() {
            if self.is_current(&key, inserted_at) {
                self.map.remove(&key);
                return;
            }
        }
    }

    fn compact(&mut self) {
        if self.order.len() < ORDER_COMPACT_MIN
            || self.order.len() <= self.map.len() * ORDER_SLACK
        {
            return;
        }
        let map = &self.map;
        self.order.retain(|(key, inserted_at)| {
            map.get(key)
                .is_some_and(|entry| entry.inserted_at == *inserted_at)
        });
    }
}

/// Concurrent map from correlation key to original sender.
///
/// Every method takes the lock for a single map operation, so readers always
/// see a fully written entry. Inserting into a full table only touches the
/// oldest records, not the whole map.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: Mutex<Entries>,
    policy: EvictionPolicy,
}

impl CorrelationTable {
    /// Create a table that never evicts.
    pub fn new() -> Self {
        Self::with_policy(EvictionPolicy::unbounded())
    }

    pub fn with_policy(policy: EvictionPolicy) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            policy,
        }
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Record `sender` for `key`, replacing any previous entry.
    ///
    /// Returns the sender that was displaced, if it was still live.
    pub fn insert(&self, key: CorrelationKey, sender: Ipv4Addr) -> Option<Ipv4Addr> {
        self.insert_at(key, sender, Instant::now())
    }

    pub fn insert_at(
        &self,
        key: CorrelationKey,
        sender: Ipv4Addr,
        now: Instant,
    ) -> Option<Ipv4Addr> {
        let mut entries = self.lock();

        if let Some(max) = self.policy.max_entries {
            if !entries.map.contains_key(&key) && entries.map.len() >= max {
                self.pop_expired(&mut entries, now);
                if entries.map.len() >= max {
                    entries.pop_oldest();
                }
            }
        }

        let previous = entries.map.insert(
            key,
            Entry {
                sender,
                inserted_at: now,
            },
        );
        entries.order.push_back((key, now));
        entries.compact();

        previous
            .filter(|entry| !self.is_expired(entry.inserted_at, now))
            .map(|entry| entry.sender)
    }

    /// Find the sender for `key` without removing it.
    pub fn lookup(&self, key: CorrelationKey) -> Option<Ipv4Addr> {
        self.lookup_at(key, Instant::now())
    }

    pub fn lookup_at(&self, key: CorrelationKey, now: Instant) -> Option<Ipv4Addr> {
        let entries = self.lock();
        entries
            .map
            .get(&key)
            .filter(|entry| !self.is_expired(entry.inserted_at, now))
            .map(|entry| entry.sender)
    }

    /// Remove entries older than the TTL. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&self, now: Instant) -> usize {
        if self.policy.ttl.is_none() {
            return 0;
        }

        let mut entries = self.lock();
        let before = entries.map.len();
        entries
            .map
            .retain(|_, entry| !self.is_expired(entry.inserted_at, now));
        let removed = before - entries.map.len();
        if removed > 0 {
            let Entries { map, order } = &mut *entries;
            order.retain(|(key, inserted_at)| {
                map.get(key)
                    .is_some_and(|entry| entry.inserted_at == *inserted_at)
            });
        }
        removed
    }

    /// Number of stored entries, including any not yet swept.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().map.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panic while holding the lock cannot leave a half-written entry
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, inserted_at: Instant, now: Instant) -> bool {
        match self.policy.ttl {
            Some(ttl) => now.saturating_duration_since(inserted_at) >= ttl,
            None => false,
        }
    }

    /// Drop expired entries from the front of the insertion order.
    fn pop_expired(&self, entries: &mut Entries, now: Instant) {
        if self.policy.ttl.is_none() {
            return;
        }

        while let Some(&(key, inserted_at)) = entries.order.front() {
            if entries.is_current(&key, inserted_at) {
                if !self.is_expired(inserted_at, now) {
                    break;
                }
                entries.map.remove(&key);
            }
            entries.order.pop_front();
        }
    }
}
