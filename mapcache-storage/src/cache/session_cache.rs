//! Per-session cache.
//!
//! Memoizes reads inside one unit of work. Any write in the session wipes it
//! completely: invalidation is by set, never by key, so a read followed by
//! `invalidate_all` and the same read always misses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use mapcache_core::{QueryFingerprint, SessionError};
use uuid::Uuid;

use super::entry::CacheEntry;
use super::traits::CacheStats;

/// Mapping from fingerprint to entry, visible only to its owning session.
#[derive(Debug)]
pub struct SessionCache {
    session_id: Uuid,
    entries: HashMap<QueryFingerprint, CacheEntry>,
    /// Highest sequence stored so far.
    last_sequence: u64,
    /// Set by `invalidate_all`, cleared by the next `put`.
    invalidated_since_put: bool,
    closed: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: u64,
}

impl SessionCache {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            entries: HashMap::new(),
            last_sequence: 0,
            invalidated_since_put: false,
            closed: false,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::SessionClosed {
                session_id: self.session_id,
            });
        }
        Ok(())
    }

    /// Look up a fingerprint. Only the hit/miss counters change.
    pub fn get(&self, fingerprint: &QueryFingerprint) -> Result<Option<CacheEntry>, SessionError> {
        self.ensure_open()?;
        let found = self.entries.get(fingerprint).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(found)
    }

    /// Store or overwrite an entry.
    ///
    /// The entry's sequence must come from the session's clock; the cache
    /// keeps the highest one it has seen.
    pub fn put(&mut self, fingerprint: QueryFingerprint, entry: CacheEntry) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.last_sequence = self.last_sequence.max(entry.sequence());
        self.invalidated_since_put = false;
        self.entries.insert(fingerprint, entry);
        Ok(())
    }

    /// Drop every entry, unconditionally.
    pub fn invalidate_all(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        if !self.entries.is_empty() {
            tracing::trace!(
                session_id = %self.session_id,
                dropped = self.entries.len(),
                "Session cache invalidated"
            );
        }
        self.evictions += self.entries.len() as u64;
        self.entries.clear();
        self.invalidated_since_put = true;
        Ok(())
    }

    /// Copy of the current entries, for promotion on commit.
    pub fn snapshot(&self) -> Result<Vec<(QueryFingerprint, CacheEntry)>, SessionError> {
        self.ensure_open()?;
        Ok(self
            .entries
            .iter()
            .map(|(fp, entry)| (fp.clone(), entry.clone()))
            .collect())
    }

    /// Close the cache.
    ///
    /// With `promote` set and no invalidation since the last population, the
    /// entries are handed back for promotion; otherwise nothing is. Every
    /// later call fails with `SessionClosed`.
    pub fn close(&mut self, promote: bool) -> Result<Vec<(QueryFingerprint, CacheEntry)>, SessionError> {
        self.ensure_open()?;
        self.closed = true;
        let entries = std::mem::take(&mut self.entries);
        if promote && !self.invalidated_since_put {
            Ok(entries.into_iter().collect())
        } else {
            Ok(Vec::new())
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
            evictions: self.evictions,
        }
    }
}
