//! Sessions: one logical unit of work over the two cache tiers.
//!
//! Read path is session cache → shared cache → collaborator. Writes always
//! reach the collaborator, wipe the session cache, and mark their namespace
//! for shared-cache invalidation when the session commits, rolls back or
//! closes. The collaborator has no transaction to undo, so a rolled back
//! write still invalidates. Only a clean commit or close emits a
//! [`PromotionEvent`] carrying the session cache contents.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use mapcache_core::{
    CacheSettings, LocalCacheScope, MapCacheResult, MappedStatement, Namespace, Params, Payload,
    QueryFingerprint, RowBounds, SessionError,
};
use uuid::Uuid;

use crate::cache::entry::{CacheEntry, CacheRead, CacheTier};
use crate::cache::registry::SharedCacheRegistry;
use crate::cache::session_cache::SessionCache;
use crate::cache::traits::{CacheStats, PromotionSink, QueryExecutor};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Open,
    /// Committed with no write since; reads keep it in this state.
    Committed,
    Closed,
}

/// Entries handed from a cleanly ending session to the shared caches.
#[derive(Debug, Clone)]
pub struct PromotionEvent {
    pub session_id: Uuid,
    batches: BTreeMap<Namespace, Vec<(QueryFingerprint, CacheEntry)>>,
}

impl PromotionEvent {
    /// Group entries by the namespace of their fingerprint.
    pub fn from_entries(session_id: Uuid, entries: Vec<(QueryFingerprint, CacheEntry)>) -> Self {
        let mut batches: BTreeMap<Namespace, Vec<_>> = BTreeMap::new();
        for (fingerprint, entry) in entries {
            batches
                .entry(fingerprint.namespace().clone())
                .or_default()
                .push((fingerprint, entry));
        }
        Self {
            session_id,
            batches,
        }
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.batches.keys()
    }

    pub fn batch(&self, namespace: &Namespace) -> Option<&[(QueryFingerprint, CacheEntry)]> {
        self.batches.get(namespace).map(Vec::as_slice)
    }

    pub fn into_batches(self) -> BTreeMap<Namespace, Vec<(QueryFingerprint, CacheEntry)>> {
        self.batches
    }

    /// Total number of entries across namespaces.
    pub fn len(&self) -> usize {
        self.batches.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub session_hits: u64,
    pub shared_hits: u64,
    /// Every collaborator invocation, reads and writes, failed or not.
    pub collaborator_calls: u64,
    pub writes: u64,
}

struct SessionInner {
    state: SessionState,
    local: SessionCache,
    /// Shared cache instances (alias-resolved namespaces) invalidated when
    /// the session commits, rolls back or closes.
    dirty: BTreeSet<Namespace>,
    uncommitted_writes: bool,
    stats: SessionStats,
}

impl SessionInner {
    fn ensure_open(&self, session_id: Uuid) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::SessionClosed { session_id });
        }
        Ok(())
    }
}

/// Marks a session busy for the duration of one operation.
struct InUseGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InUseGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// One unit of work.
///
/// Meant for a single thread of control at a time. Overlapping calls (from
/// another thread, or re-entered from inside the collaborator) fail with
/// `ConcurrentSessionUse` instead of corrupting state.
pub struct Session {
    id: Uuid,
    settings: Arc<CacheSettings>,
    executor: Arc<dyn QueryExecutor>,
    registry: Arc<SharedCacheRegistry>,
    sink: Arc<dyn PromotionSink>,
    in_use: AtomicBool,
    inner: Mutex<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    fn new(
        settings: Arc<CacheSettings>,
        executor: Arc<dyn QueryExecutor>,
        registry: Arc<SharedCacheRegistry>,
        sink: Arc<dyn PromotionSink>,
    ) -> Self {
        let id = Uuid::now_v7();
        Self {
            id,
            settings,
            executor,
            registry,
            sink,
            in_use: AtomicBool::new(false),
            inner: Mutex::new(SessionInner {
                state: SessionState::Open,
                local: SessionCache::new(id),
                dirty: BTreeSet::new(),
                uncommitted_writes: false,
                stats: SessionStats::default(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    pub fn stats(&self) -> SessionStats {
        self.lock().stats
    }

    /// Number of entries in this session's cache.
    pub fn cached_entries(&self) -> usize {
        self.lock().local.len()
    }

    /// Counters of this session's cache tier.
    pub fn cache_stats(&self) -> CacheStats {
        self.lock().local.stats()
    }

    /// Alias-resolved namespaces invalidated when the session next commits,
    /// rolls back or closes.
    pub fn dirty_namespaces(&self) -> Vec<Namespace> {
        self.lock().dirty.iter().cloned().collect()
    }

    /// Resolve a configured statement.
    pub fn statement(&self, namespace: &str, id: &str) -> MapCacheResult<MappedStatement> {
        Ok(self.settings.statement(namespace, id)?)
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self) -> Result<InUseGuard<'_>, SessionError> {
        self.in_use
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| InUseGuard {
                flag: &self.in_use,
            })
            .map_err(|_| SessionError::ConcurrentSessionUse {
                session_id: self.id,
            })
    }

    /// Run a read through both cache tiers.
    ///
    /// A miss everywhere invokes the collaborator exactly once, outside any
    /// cache lock. A failed invocation leaves both tiers untouched.
    pub fn select(
        &self,
        statement: &MappedStatement,
        params: Params,
        bounds: RowBounds,
    ) -> MapCacheResult<CacheRead<Payload>> {
        let _guard = self.enter()?;
        let fingerprint = statement.fingerprint(params, bounds);
        let cacheable = statement.use_cache && !statement.kind.is_write();

        let sequence = {
            let mut inner = self.lock();
            inner.ensure_open(self.id)?;

            // A flushing select clears the caches first, so it can never hit.
            if cacheable && !statement.flush_cache {
                if let Some(entry) = inner.local.get(&fingerprint)? {
                    inner.stats.session_hits += 1;
                    tracing::trace!(
                        session_id = %self.id,
                        statement = %fingerprint,
                        sequence = entry.sequence(),
                        "Session cache hit"
                    );
                    let payload = entry.payload().clone();
                    return Ok(CacheRead::from_entry(payload, CacheTier::Session, &entry));
                }

                // Namespaces this session wrote to are about to be
                // invalidated; their shared entries are already stale here.
                let shared_namespace = self.registry.resolve(fingerprint.namespace());
                if self.settings.cache_enabled && !inner.dirty.contains(&shared_namespace) {
                    if let Some(entry) = self.registry.get(&fingerprint) {
                        inner.stats.shared_hits += 1;
                        tracing::trace!(
                            session_id = %self.id,
                            statement = %fingerprint,
                            sequence = entry.sequence(),
                            "Shared cache hit"
                        );
                        let payload = entry.payload().clone();
                        return Ok(CacheRead::from_entry(payload, CacheTier::Shared, &entry));
                    }
                }
            }

            // Stamp before executing: a write that commits while the query
            // runs must be able to invalidate this result.
            self.registry.clock().tick()
        };

        tracing::debug!(
            session_id = %self.id,
            statement = %fingerprint,
            digest = %fingerprint.digest(),
            sequence,
            "Cache miss, invoking collaborator"
        );
        let outcome = self.executor.execute(statement, fingerprint.params());

        let mut inner = self.lock();
        inner.stats.collaborator_calls += 1;
        let result = outcome.inspect_err(|e| {
            tracing::warn!(
                session_id = %self.id,
                statement = %fingerprint,
                error = %e,
                "Collaborator failed, cache untouched"
            );
        })?;
        let result = fingerprint.bounds().apply(result);

        if statement.flush_cache {
            inner.local.invalidate_all()?;
            inner.dirty.insert(self.registry.resolve(&statement.namespace));
        }
        if cacheable {
            inner
                .local
                .put(fingerprint, CacheEntry::new(&result, sequence))?;
            if self.settings.local_cache_scope == LocalCacheScope::Statement {
                inner.local.invalidate_all()?;
            }
        }

        Ok(CacheRead::from_collaborator(result, sequence))
    }

    /// Run an insert, update or delete. Never cached.
    ///
    /// On success the session cache is wiped and, for flushing statements,
    /// the namespace is invalidated in the shared cache at commit.
    pub fn update(&self, statement: &MappedStatement, params: Params) -> MapCacheResult<Payload> {
        let _guard = self.enter()?;
        self.lock().ensure_open(self.id)?;

        let outcome = self.executor.execute(statement, &params);

        let mut inner = self.lock();
        inner.stats.collaborator_calls += 1;
        let result = outcome.inspect_err(|e| {
            tracing::warn!(
                session_id = %self.id,
                statement = %statement.qualified_id(),
                error = %e,
                "Write failed, cache untouched"
            );
        })?;

        inner.stats.writes += 1;
        inner.local.invalidate_all()?;
        inner.uncommitted_writes = true;
        inner.state = SessionState::Open;
        if statement.flush_cache {
            inner.dirty.insert(self.registry.resolve(&statement.namespace));
        }
        tracing::debug!(
            session_id = %self.id,
            statement = %statement.qualified_id(),
            flush = statement.flush_cache,
            "Write executed, session cache invalidated"
        );
        Ok(result)
    }

    /// Commit: invalidate written namespaces, then promote the session cache.
    ///
    /// The session stays usable afterwards.
    pub fn commit(&self) -> MapCacheResult<()> {
        let _guard = self.enter()?;
        let mut inner = self.lock();
        inner.ensure_open(self.id)?;

        let entries = inner.local.snapshot()?;
        let dirty = std::mem::take(&mut inner.dirty);
        inner.uncommitted_writes = false;
        inner.state = SessionState::Committed;
        drop(inner);

        self.publish(dirty, entries);
        Ok(())
    }

    /// Discard the session cache without promoting it.
    ///
    /// Writes already reached the collaborator, so their namespaces are
    /// still invalidated in the shared cache.
    pub fn rollback(&self) -> MapCacheResult<()> {
        let _guard = self.enter()?;
        let mut inner = self.lock();
        inner.ensure_open(self.id)?;

        inner.local.invalidate_all()?;
        let dirty = std::mem::take(&mut inner.dirty);
        inner.uncommitted_writes = false;
        inner.state = SessionState::Open;
        drop(inner);

        self.invalidate_written(&dirty);
        tracing::debug!(session_id = %self.id, "Session rolled back");
        Ok(())
    }

    /// Empty this session's cache only. Other sessions and the shared
    /// caches are unaffected.
    pub fn clear_cache(&self) -> MapCacheResult<()> {
        let _guard = self.enter()?;
        let mut inner = self.lock();
        inner.ensure_open(self.id)?;
        inner.local.invalidate_all()?;
        Ok(())
    }

    /// End the session.
    ///
    /// Without uncommitted writes this behaves like a commit and the session
    /// cache is promoted. With uncommitted writes it behaves like a rollback
    /// and promotes nothing. Pending invalidations are applied either way.
    pub fn close(&self) -> MapCacheResult<()> {
        let _guard = self.enter()?;
        let mut inner = self.lock();
        inner.ensure_open(self.id)?;

        let clean = !inner.uncommitted_writes;
        let entries = inner.local.close(clean && self.settings.cache_enabled)?;
        let dirty = std::mem::take(&mut inner.dirty);
        inner.state = SessionState::Closed;
        drop(inner);

        if clean {
            self.publish(dirty, entries);
        } else {
            self.invalidate_written(&dirty);
            tracing::debug!(
                session_id = %self.id,
                invalidated = dirty.len(),
                "Session closed with uncommitted writes, nothing promoted"
            );
        }
        Ok(())
    }

    fn invalidate_written(&self, dirty: &BTreeSet<Namespace>) {
        if !self.settings.cache_enabled {
            return;
        }
        for namespace in dirty {
            let watermark = self.registry.invalidate(namespace);
            tracing::info!(
                session_id = %self.id,
                %namespace,
                watermark = watermark.sequence,
                "Shared cache invalidated by write"
            );
        }
    }

    fn publish(&self, dirty: BTreeSet<Namespace>, entries: Vec<(QueryFingerprint, CacheEntry)>) {
        if !self.settings.cache_enabled {
            return;
        }
        self.invalidate_written(&dirty);

        let event = PromotionEvent::from_entries(self.id, entries);
        if !event.is_empty() {
            self.sink.promote(event);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        if inner.state != SessionState::Closed {
            tracing::debug!(
                session_id = %self.id,
                "Session dropped without close, nothing promoted"
            );
        }
    }
}

/// Opens sessions that share one registry, collaborator and settings.
#[derive(Clone)]
pub struct SessionFactory {
    settings: Arc<CacheSettings>,
    executor: Arc<dyn QueryExecutor>,
    registry: Arc<SharedCacheRegistry>,
    sink: Arc<dyn PromotionSink>,
}

impl fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl SessionFactory {
    /// Validate `settings` and build a factory with a fresh registry.
    pub fn new(settings: CacheSettings, executor: Arc<dyn QueryExecutor>) -> MapCacheResult<Self> {
        settings.validate()?;
        let registry = Arc::new(SharedCacheRegistry::from_settings(&settings));
        let sink: Arc<dyn PromotionSink> = registry.clone();
        Ok(Self {
            settings: Arc::new(settings),
            executor,
            registry,
            sink,
        })
    }

    /// Route promotion events through `sink` instead of straight to the
    /// registry.
    ///
    /// Reads and invalidations always use [`Self::registry`]. A sink that
    /// does not forward to that registry makes promoted entries invisible
    /// to later sessions, so wrap or forward to it (for auditing or
    /// filtering) rather than replacing it.
    pub fn with_promotion_sink(mut self, sink: Arc<dyn PromotionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn open_session(&self) -> Session {
        let session = Session::new(
            Arc::clone(&self.settings),
            Arc::clone(&self.executor),
            Arc::clone(&self.registry),
            Arc::clone(&self.sink),
        );
        tracing::debug!(session_id = %session.id(), "Session opened");
        session
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<SharedCacheRegistry> {
        &self.registry
    }

    pub fn statement(&self, namespace: &str, id: &str) -> MapCacheResult<MappedStatement> {
        Ok(self.settings.statement(namespace, id)?)
    }
}
