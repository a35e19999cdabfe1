//! Seams between the cache and the outside world.
//!
//! The query-execution collaborator and the consumer of promotion events are
//! both traits, so sessions can be wired to a real database adapter, the
//! in-memory table, or a test double.

use mapcache_core::{ExecutorError, MappedStatement, Params, Payload};

use crate::session::PromotionEvent;

/// The external query-execution collaborator.
///
/// Idempotent for selects, side-effecting for writes. Implementations must
/// be thread-safe: several sessions may call it at once.
pub trait QueryExecutor: Send + Sync {
    /// Run one statement with its bound parameters.
    fn execute(&self, statement: &MappedStatement, params: &Params)
        -> Result<Payload, ExecutorError>;
}

impl<E: QueryExecutor + ?Sized> QueryExecutor for std::sync::Arc<E> {
    fn execute(
        &self,
        statement: &MappedStatement,
        params: &Params,
    ) -> Result<Payload, ExecutorError> {
        (**self).execute(statement, params)
    }
}

/// Consumer of the entries a session hands over on a clean commit/close.
pub trait PromotionSink: Send + Sync {
    fn promote(&self, event: PromotionEvent);
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of live entries currently in cache.
    pub entry_count: u64,
    /// Entries dropped because an invalidation made them stale.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Sum two snapshots (used when several namespaces share one cache).
    pub fn merged(&self, other: &CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            entry_count: self.entry_count + other.entry_count,
            evictions: self.evictions + other.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_cache_stats_merged() {
        let a = CacheStats {
            hits: 1,
            misses: 2,
            entry_count: 3,
            evictions: 4,
        };
        let b = a.merged(&a);
        assert_eq!(b.hits, 2);
        assert_eq!(b.evictions, 8);
    }
}
