//! Verification result cache.
//!
//! Two tables keyed by [`Fingerprint`] (never the raw candidate):
//! - positive: definite verdicts (Safe / Compromised), long TTL
//! - negative: recent remote failures, short TTL, so a service that just failed
//!   is not hammered again for the same candidate
//!
//! Entries expire lazily on lookup and in bulk via [`cache_sweep_worker`].
//! Each table is bounded; inserting into a full table evicts the oldest entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use warden_common::{CacheStats, UnknownReason, VerificationVerdict};

use crate::config::CacheConfig;
use crate::fingerprint::Fingerprint;

/// A cached verdict
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub verdict: VerificationVerdict,
    pub inserted_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Which table answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedVerdict {
    /// Definite verdict from the positive table
    Positive(VerificationVerdict),
    /// Recent failure from the negative table
    Negative(UnknownReason),
}

#[derive(Default)]
struct Table {
    entries: HashMap<Fingerprint, CacheEntry>,
}

impl Table {
    /// Returns the number of entries evicted to make room
    fn insert(&mut self, key: Fingerprint, entry: CacheEntry, max_entries: usize) -> u64 {
        let mut evicted = 0;
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= max_entries {
                let Some(oldest) = self
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                self.entries.remove(&oldest);
                evicted += 1;
            }
        }
        self.entries.insert(key, entry);
        evicted
    }

    fn get(&mut self, key: &Fingerprint, now: Instant) -> Lookup {
        let verdict = match self.entries.get(key) {
            None => return Lookup::Miss,
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => Some(entry.verdict),
        };

        match verdict {
            Some(verdict) => Lookup::Hit(verdict),
            None => {
                self.entries.remove(key);
                Lookup::Expired
            }
        }
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before - self.entries.len()
    }
}

enum Lookup {
    Hit(VerificationVerdict),
    Expired,
    Miss,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
}

/// Positive + negative verdict cache
pub struct ResultCache {
    positive: Mutex<Table>,
    negative: Mutex<Table>,
    positive_ttl: Duration,
    negative_ttl: Duration,
    max_entries: usize,
    counters: Counters,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            positive: Mutex::new(Table::default()),
            negative: Mutex::new(Table::default()),
            positive_ttl: Duration::from_secs(config.positive_ttl_secs),
            negative_ttl: Duration::from_secs(config.negative_ttl_secs),
            max_entries: config.max_entries.max(1),
            counters: Counters::default(),
        }
    }

    /// Positive table first, then negative
    pub fn lookup(&self, key: &Fingerprint) -> Option<CachedVerdict> {
        let now = Instant::now();

        let positive = lock(&self.positive).get(key, now);
        if let Some(verdict) = self.account(positive) {
            return Some(CachedVerdict::Positive(verdict));
        }

        let negative = lock(&self.negative).get(key, now);
        match self.account(negative) {
            Some(VerificationVerdict::Unknown { reason }) => Some(CachedVerdict::Negative(reason)),
            Some(_) => None,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Record a definite verdict. Clears any negative entry for the same key.
    pub fn put_positive(&self, key: Fingerprint, verdict: VerificationVerdict) {
        if !verdict.is_definite() {
            return;
        }
        lock(&self.negative).entries.remove(&key);
        let entry = self.entry(verdict, self.positive_ttl);
        let evicted = lock(&self.positive).insert(key, entry, self.max_entries);
        self.counters.evicted.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Record a recent failure
    pub fn put_negative(&self, key: Fingerprint, reason: UnknownReason) {
        let entry = self.entry(VerificationVerdict::unknown(reason), self.negative_ttl);
        let evicted = lock(&self.negative).insert(key, entry, self.max_entries);
        self.counters.evicted.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Drop expired entries from both tables
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let removed = lock(&self.positive).sweep(now) + lock(&self.negative).sweep(now);
        self.counters.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) {
        lock(&self.positive).entries.clear();
        lock(&self.negative).entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            positive_entries: lock(&self.positive).entries.len(),
            negative_entries: lock(&self.negative).entries.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }

    fn entry(&self, verdict: VerificationVerdict, ttl: Duration) -> CacheEntry {
        let now = Instant::now();
        CacheEntry {
            verdict,
            inserted_at: now,
            expires_at: now + ttl,
        }
    }

    fn account(&self, lookup: Lookup) -> Option<VerificationVerdict> {
        match lookup {
            Lookup::Hit(verdict) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(verdict)
            }
            Lookup::Expired => {
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Miss => None,
        }
    }
}

fn lock(table: &Mutex<Table>) -> MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Background worker that sweeps expired entries
pub async fn cache_sweep_worker(
    cache: Arc<ResultCache>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(interval = ?interval, "Cache sweeper started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let removed = cache.sweep();
                if removed > 0 {
                    tracing::debug!(removed = removed, "Swept expired cache entries");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Cache sweeper shutting down");
                break;
            }
        }
    }
}
