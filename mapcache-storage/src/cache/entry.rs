//! Cache entries and read results.

use chrono::{DateTime, Utc};
use mapcache_core::Payload;

/// A stored query result plus the logical time it was read at.
///
/// The payload is an owned deep copy; callers that mutate the value they got
/// back never affect what the cache holds.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    payload: Payload,
    sequence: u64,
    cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Copy `payload` into a new entry stamped with `sequence`.
    pub fn new(payload: &Payload, sequence: u64) -> Self {
        Self {
            payload: payload.clone(),
            sequence,
            cached_at: Utc::now(),
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Creation sequence on the logical clock.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }
}

/// Which tier answered a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    Session,
    Shared,
    /// Neither cache had it; the query-execution collaborator ran.
    Collaborator,
}

/// Result of a read, carrying where it came from.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    tier: CacheTier,
    sequence: u64,
    cached_at: DateTime<Utc>,
}

impl<T> CacheRead<T> {
    /// Build a read served from a cached entry.
    pub fn from_entry(value: T, tier: CacheTier, entry: &CacheEntry) -> Self {
        Self {
            value,
            tier,
            sequence: entry.sequence(),
            cached_at: entry.cached_at(),
        }
    }

    /// Build a read that came straight from the collaborator.
    pub fn from_collaborator(value: T, sequence: u64) -> Self {
        Self {
            value,
            tier: CacheTier::Collaborator,
            sequence,
            cached_at: Utc::now(),
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn tier(&self) -> CacheTier {
        self.tier
    }

    /// Logical time the value was read from the collaborator.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.tier != CacheTier::Collaborator
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit()
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            tier: self.tier,
            sequence: self.sequence,
            cached_at: self.cached_at,
        }
    }

    /// Fallible [`map`](Self::map).
    pub fn try_map<U, E, F>(self, f: F) -> Result<CacheRead<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(CacheRead {
            value: f(self.value)?,
            tier: self.tier,
            sequence: self.sequence,
            cached_at: self.cached_at,
        })
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
