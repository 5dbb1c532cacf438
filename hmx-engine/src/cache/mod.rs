//! Bounded TTL cache for analysis results
//!
//! Expiry is lazy: an expired entry is dropped when a lookup finds it.
//! Capacity eviction is FIFO by insertion order; reads never refresh an
//! entry's position.
//!
//! `CacheStore` is not synchronized. The request coordinator owns it behind
//! its state lock.

pub mod persistence;

pub use persistence::CachePersistence;

use chrono::{DateTime, Utc};
use hmx_common::time::{expiry_after, now};
use hmx_common::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// A cached result with its lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: AnalysisResult,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Insertion sequence number (FIFO order)
    seq: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Serialized form of a cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub key: String,
    pub value: AnalysisResult,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Bounded key/value store with TTL expiry and FIFO eviction
#[derive(Debug)]
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    /// Insertion sequence -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
    max_entries: usize,
}

impl CacheStore {
    /// Create a store holding at most `max_entries` (minimum 1)
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key`, dropping it if expired
    pub fn get(&mut self, key: &str) -> Option<&AnalysisResult> {
        self.get_at(key, now())
    }

    pub fn get_at(&mut self, key: &str, now: DateTime<Utc>) -> Option<&AnalysisResult> {
        let expired = self.entries.get(key)?.is_expired(now);
        if expired {
            self.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Whether a live entry exists, without the lazy-expiry side effect
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now()))
    }

    /// Insert `value` under `key` for `ttl`
    ///
    /// Overwriting a key counts as a fresh insertion. When the store is full
    /// the oldest-inserted entry is evicted first.
    pub fn put(&mut self, key: String, value: AnalysisResult, ttl: Duration) {
        self.put_at(key, value, ttl, now());
    }

    pub fn put_at(&mut self, key: String, value: AnalysisResult, ttl: Duration, now: DateTime<Utc>) {
        let expires_at = expiry_after(now, ttl);
        self.insert_entry(key, value, now, expires_at);
    }

    fn insert_entry(
        &mut self,
        key: String,
        value: AnalysisResult,
        stored_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) {
        self.remove(&key);

        while self.entries.len() >= self.max_entries {
            match self.order.pop_first() {
                Some((_, oldest)) => {
                    tracing::debug!(key = %oldest, "Evicting oldest cache entry");
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at,
                expires_at,
                seq,
            },
        );
    }

    /// Remove `key`; returns whether it was present
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Drop every entry expired at `now`; returns how many were dropped
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// All entries in insertion order
    pub fn snapshot(&self) -> Vec<CacheRecord> {
        self.order
            .values()
            .filter_map(|key| {
                self.entries.get(key).map(|entry| CacheRecord {
                    key: key.clone(),
                    value: entry.value.clone(),
                    stored_at: entry.stored_at,
                    expires_at: entry.expires_at,
                })
            })
            .collect()
    }

    /// Load records (oldest first), skipping any already expired at `now`
    ///
    /// Returns how many distinct restored keys are present afterwards.
    /// Capacity still applies, so a snapshot larger than the store keeps its
    /// newest entries; existing entries count toward capacity too.
    pub fn restore(&mut self, records: Vec<CacheRecord>, now: DateTime<Utc>) -> usize {
        let mut restored = HashSet::new();
        for record in records {
            if now > record.expires_at {
                continue;
            }
            restored.insert(record.key.clone());
            self.insert_entry(record.key, record.value, record.stored_at, record.expires_at);
        }
        restored
            .iter()
            .filter(|key| self.entries.contains_key(key.as_str()))
            .count()
    }
}
