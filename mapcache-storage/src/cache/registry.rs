//! Namespace → shared cache registry.
//!
//! Owns the process-wide shared cache state with an explicit lifecycle:
//! caches are created on first reference to a namespace and torn down only
//! through `clear_namespace`, `clear_all` or `reset`. Namespaces configured
//! with a `cache_ref` resolve to the referenced namespace's instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use mapcache_core::{CacheSettings, Namespace, QueryFingerprint};

use super::entry::CacheEntry;
use super::shared_cache::{MergeOutcome, SharedCache};
use super::traits::{CacheStats, PromotionSink};
use super::watermark::{LogicalClock, Watermark};
use crate::session::PromotionEvent;

/// Registry of shared caches, one per (resolved) namespace.
#[derive(Debug)]
pub struct SharedCacheRegistry {
    clock: Arc<LogicalClock>,
    aliases: BTreeMap<Namespace, Namespace>,
    caches: RwLock<HashMap<Namespace, Arc<SharedCache>>>,
}

impl Default for SharedCacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedCacheRegistry {
    /// Registry with no namespace aliases.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(LogicalClock::new()),
            aliases: BTreeMap::new(),
            caches: RwLock::new(HashMap::new()),
        }
    }

    /// Registry honoring the `cache_ref` aliases in `settings`.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            aliases: settings.cache_aliases(),
            ..Self::new()
        }
    }

    /// The clock every session and cache of this registry stamps with.
    pub fn clock(&self) -> &Arc<LogicalClock> {
        &self.clock
    }

    /// Namespace whose cache instance `namespace` uses.
    pub fn resolve(&self, namespace: &Namespace) -> Namespace {
        self.aliases
            .get(namespace)
            .cloned()
            .unwrap_or_else(|| namespace.clone())
    }

    /// Get or lazily create the cache for `namespace`.
    pub fn cache(&self, namespace: &Namespace) -> Arc<SharedCache> {
        let resolved = self.resolve(namespace);
        if let Some(cache) = self
            .caches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&resolved)
        {
            return Arc::clone(cache);
        }

        let mut caches = self.caches.write().unwrap_or_else(|e| e.into_inner());
        let cache = caches.entry(resolved.clone()).or_insert_with(|| {
            tracing::debug!(namespace = %resolved, "Creating shared cache");
            Arc::new(SharedCache::new(resolved.clone(), Arc::clone(&self.clock)))
        });
        Arc::clone(cache)
    }

    /// Existing cache for `namespace`, without creating one.
    pub fn existing(&self, namespace: &Namespace) -> Option<Arc<SharedCache>> {
        let resolved = self.resolve(namespace);
        self.caches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&resolved)
            .cloned()
    }

    /// Look a fingerprint up in its namespace's cache.
    pub fn get(&self, fingerprint: &QueryFingerprint) -> Option<CacheEntry> {
        self.cache(fingerprint.namespace()).get(fingerprint)
    }

    pub fn merge(
        &self,
        namespace: &Namespace,
        entries: Vec<(QueryFingerprint, CacheEntry)>,
    ) -> MergeOutcome {
        self.cache(namespace).merge(entries)
    }

    pub fn invalidate(&self, namespace: &Namespace) -> Watermark {
        self.cache(namespace).invalidate()
    }

    /// Operator reset of one namespace (and every alias sharing it).
    pub fn clear_namespace(&self, namespace: &Namespace) {
        if let Some(cache) = self.existing(namespace) {
            cache.clear();
            tracing::info!(namespace = %cache.namespace(), "Shared cache cleared");
        }
    }

    /// Operator reset of every namespace. Instances are kept.
    pub fn clear_all(&self) {
        let caches: Vec<_> = self
            .caches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for cache in &caches {
            cache.clear();
        }
        tracing::info!(namespaces = caches.len(), "All shared caches cleared");
    }

    /// Tear down every instance. The next reference recreates them empty.
    ///
    /// Every namespace's watermark is raised first, so holders of an old
    /// `Arc<SharedCache>` cannot serve or accept pre-reset entries.
    pub fn reset(&self) {
        let mut caches = self.caches.write().unwrap_or_else(|e| e.into_inner());
        for cache in caches.values() {
            cache.clear();
        }
        let dropped = caches.len();
        caches.clear();
        tracing::info!(namespaces = dropped, "Shared cache registry reset");
    }

    /// Namespaces that currently own a cache instance.
    pub fn namespaces(&self) -> Vec<Namespace> {
        let mut names: Vec<_> = self
            .caches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Statistics per cache instance.
    pub fn stats(&self) -> BTreeMap<Namespace, CacheStats> {
        self.caches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(ns, cache)| (ns.clone(), cache.stats()))
            .collect()
    }

    /// Statistics summed over every instance.
    pub fn total_stats(&self) -> CacheStats {
        self.stats()
            .values()
            .fold(CacheStats::default(), |acc, s| acc.merged(s))
    }
}

impl PromotionSink for SharedCacheRegistry {
    fn promote(&self, event: PromotionEvent) {
        let session_id = event.session_id;
        for (namespace, entries) in event.into_batches() {
            let offered = entries.len();
            let outcome = self.merge(&namespace, entries);
            tracing::info!(
                %session_id,
                %namespace,
                offered,
                accepted = outcome.accepted,
                stale = outcome.stale,
                superseded = outcome.superseded,
                "Promoted session entries into shared cache"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapcache_core::{NamespaceSettings, Params, RowBounds};
    use serde_json::json;

    fn fp(ns: &str, id: i64) -> QueryFingerprint {
        QueryFingerprint::new(
            Namespace::from(ns),
            "getById",
            Params::new().with("id", id),
            RowBounds::unbounded(),
        )
    }

    #[test]
    fn test_lazy_creation() {
        let registry = SharedCacheRegistry::new();
        assert!(registry.namespaces().is_empty());
        assert!(registry.existing(&Namespace::from("Employee")).is_none());

        let a = registry.cache(&Namespace::from("Employee"));
        let b = registry.cache(&Namespace::from("Employee"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.namespaces(), vec![Namespace::from("Employee")]);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let registry = SharedCacheRegistry::new();
        let seq = registry.clock().tick();
        registry.merge(
            &Namespace::from("Employee"),
            vec![(fp("Employee", 1), CacheEntry::new(&json!(1), seq))],
        );
        registry.merge(
            &Namespace::from("Department"),
            vec![(fp("Department", 1), CacheEntry::new(&json!(2), seq))],
        );

        registry.invalidate(&Namespace::from("Employee"));
        assert!(registry.get(&fp("Employee", 1)).is_none());
        assert!(registry.get(&fp("Department", 1)).is_some());
    }

    #[test]
    fn test_cache_ref_shares_instance() {
        let settings = CacheSettings::default()
            .with_namespace("Employee", NamespaceSettings::default())
            .with_namespace(
                "Department",
                NamespaceSettings::default().with_cache_ref("Employee"),
            );
        let registry = SharedCacheRegistry::from_settings(&settings);

        let emp = registry.cache(&Namespace::from("Employee"));
        let dept = registry.cache(&Namespace::from("Department"));
        assert!(Arc::ptr_eq(&emp, &dept));

        let seq = registry.clock().tick();
        registry.merge(
            &Namespace::from("Department"),
            vec![(fp("Department", 1), CacheEntry::new(&json!(1), seq))],
        );
        // A write against the owner invalidates the borrower's entries too.
        registry.invalidate(&Namespace::from("Employee"));
        assert!(registry.get(&fp("Department", 1)).is_none());
    }

    #[test]
    fn test_clear_namespace_and_reset() {
        let registry = SharedCacheRegistry::new();
        let ns = Namespace::from("Employee");
        let seq = registry.clock().tick();
        registry.merge(&ns, vec![(fp("Employee", 1), CacheEntry::new(&json!(1), seq))]);

        registry.clear_namespace(&ns);
        assert!(registry.get(&fp("Employee", 1)).is_none());
        assert_eq!(registry.namespaces().len(), 1);

        let old = registry.cache(&ns);
        registry.reset();
        assert!(registry.namespaces().is_empty());
        // A stale handle refuses entries read before the reset.
        let outcome = old.merge(vec![(fp("Employee", 2), CacheEntry::new(&json!(2), seq))]);
        assert_eq!(outcome.stale, 1);
    }

    #[test]
    fn test_promote_event_merges_per_namespace() {
        let registry = SharedCacheRegistry::new();
        let seq = registry.clock().tick();
        let event = PromotionEvent::from_entries(
            uuid::Uuid::now_v7(),
            vec![
                (fp("Employee", 1), CacheEntry::new(&json!(1), seq)),
                (fp("Department", 9), CacheEntry::new(&json!(9), seq)),
            ],
        );
        registry.promote(event);

        assert!(registry.get(&fp("Employee", 1)).is_some());
        assert!(registry.get(&fp("Department", 9)).is_some());
        assert_eq!(registry.total_stats().entry_count, 2);
    }
}
