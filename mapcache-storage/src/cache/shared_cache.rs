//! Per-namespace shared cache.
//!
//! Populated only by sessions that ended cleanly, read by every session, and
//! invalidated as a whole by any write to the namespace. Invalidation raises
//! a watermark instead of walking the map; `get` filters by it and `merge`
//! purges what it leaves behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mapcache_core::{Namespace, QueryFingerprint};

use super::entry::CacheEntry;
use super::traits::CacheStats;
use super::watermark::{LogicalClock, Watermark};

/// What a `merge` did with the entries it was handed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Stored (new fingerprint or newer sequence).
    pub accepted: usize,
    /// Dropped: created before the namespace's current watermark.
    pub stale: usize,
    /// Dropped: an entry with an equal or newer sequence was already stored.
    pub superseded: usize,
}

#[derive(Debug, Default)]
struct SharedInner {
    entries: HashMap<QueryFingerprint, CacheEntry>,
    watermark: Watermark,
    evictions: u64,
}

impl SharedInner {
    /// Physically drop entries the watermark already hides.
    fn purge_stale(&mut self) {
        let watermark = self.watermark;
        let before = self.entries.len();
        self.entries.retain(|_, entry| watermark.admits(entry.sequence()));
        self.evictions += (before - self.entries.len()) as u64;
    }
}

/// Shared cache for one namespace. Safe to use from many sessions at once.
#[derive(Debug)]
pub struct SharedCache {
    namespace: Namespace,
    clock: Arc<LogicalClock>,
    inner: RwLock<SharedInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SharedCache {
    pub fn new(namespace: Namespace, clock: Arc<LogicalClock>) -> Self {
        Self {
            namespace,
            clock,
            inner: RwLock::new(SharedInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    // A panic while holding the lock cannot leave the map half-updated in a
    // way `get` would misread, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, SharedInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SharedInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a fingerprint, honoring the invalidation watermark.
    pub fn get(&self, fingerprint: &QueryFingerprint) -> Option<CacheEntry> {
        let inner = self.read();
        let found = inner
            .entries
            .get(fingerprint)
            .filter(|entry| inner.watermark.admits(entry.sequence()))
            .cloned();
        drop(inner);

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Merge entries promoted from a session.
    ///
    /// Last writer wins by sequence, not by arrival order. Entries created
    /// before the watermark (as seen under the write lock) are discarded, so
    /// a merge racing an invalidation can never resurrect stale data.
    pub fn merge<I>(&self, entries: I) -> MergeOutcome
    where
        I: IntoIterator<Item = (QueryFingerprint, CacheEntry)>,
    {
        let mut outcome = MergeOutcome::default();
        let mut inner = self.write();
        inner.purge_stale();
        let watermark = inner.watermark;

        for (fingerprint, entry) in entries {
            if !watermark.admits(entry.sequence()) {
                outcome.stale += 1;
                continue;
            }
            match inner.entries.get(&fingerprint) {
                Some(existing) if existing.sequence() >= entry.sequence() => {
                    outcome.superseded += 1;
                }
                _ => {
                    inner.entries.insert(fingerprint, entry);
                    outcome.accepted += 1;
                }
            }
        }
        drop(inner);

        if outcome.stale > 0 {
            tracing::warn!(
                namespace = %self.namespace,
                stale = outcome.stale,
                watermark = watermark.sequence,
                "Discarded promoted entries older than the invalidation watermark"
            );
        }
        outcome
    }

    /// Logically discard everything created so far.
    ///
    /// Raises the watermark to a fresh clock tick; entries are purged lazily.
    pub fn invalidate(&self) -> Watermark {
        let mut inner = self.write();
        let watermark = Watermark::new(self.clock.tick());
        inner.watermark = watermark;
        tracing::debug!(
            namespace = %self.namespace,
            watermark = watermark.sequence,
            "Shared cache invalidated"
        );
        watermark
    }

    /// Evict everything now.
    ///
    /// Also raises the watermark, so sessions that read before the reset
    /// cannot repopulate the cache with what they saw.
    pub fn clear(&self) {
        let mut inner = self.write();
        let dropped = inner.entries.len() as u64;
        inner.entries.clear();
        inner.evictions += dropped;
        inner.watermark = Watermark::new(self.clock.tick());
    }

    pub fn watermark(&self) -> Watermark {
        self.read().watermark
    }

    /// Entries visible to `get` right now.
    pub fn len(&self) -> usize {
        let inner = self.read();
        inner
            .entries
            .values()
            .filter(|entry| inner.watermark.admits(entry.sequence()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.read();
        let live = inner
            .entries
            .values()
            .filter(|entry| inner.watermark.admits(entry.sequence()))
            .count() as u64;
        let hidden = inner.entries.len() as u64 - live;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: live,
            evictions: inner.evictions + hidden,
        }
    }
}
