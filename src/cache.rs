//! LRU cache of decoded indexes in front of the [`IndexStore`].
//!
//! The store is authoritative; the cache only saves repeated decoding.
//! Each entry remembers the [`IndexStore::version`] it was loaded at, and a
//! lookup that finds a newer version drops the entry. A mutation through any
//! store path is therefore visible to the next lookup once the mutation has
//! returned. Misses load under the scope's guard, so a load can never race a
//! write and re-insert a snapshot older than the write.
//! [`IndexCache::invalidate`] releases an entry's memory early.

use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scope::Scope;
use crate::store::{IndexStore, ScopeGuard};
use crate::vector::FlatIndex;

/// Default number of resident indexes.
pub const DEFAULT_CACHE_CAPACITY: usize = 50;

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of lookups served from memory.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug)]
struct Entry {
    version: u64,
    index: Arc<FlatIndex>,
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<Scope, Entry>,
    stats: CacheStats,
}

/// A capacity-bounded LRU of loaded indexes keyed by scope.
#[derive(Debug)]
pub struct IndexCache {
    store: Arc<IndexStore>,
    inner: Mutex<Inner>,
}

impl IndexCache {
    /// A capacity of zero is treated as one.
    pub fn new(store: Arc<IndexStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// The cached index for `scope`, loading it on a miss.
    ///
    /// A hit promotes the entry to most recently used. A miss fails with
    /// `NotFound` if the scope has no artifact.
    pub fn get_or_load(&self, scope: Scope) -> Result<Arc<FlatIndex>> {
        if let Some(index) = self.lookup(scope) {
            return Ok(index);
        }
        let guard = self.store.lock(scope);
        self.get_or_load_locked(&guard)
    }

    /// [`IndexCache::get_or_load`] for a caller already holding the guard.
    pub fn get_or_load_locked(&self, guard: &ScopeGuard) -> Result<Arc<FlatIndex>> {
        let scope = guard.scope();
        if let Some(index) = self.lookup(scope) {
            return Ok(index);
        }

        // Stable while the guard is held.
        let version = self.store.version(scope);
        let index = Arc::new(self.store.load(scope)?);

        let mut inner = self.inner.lock();
        inner.stats.misses += 1;
        let entry = Entry {
            version,
            index: Arc::clone(&index),
        };
        if let Some((evicted, _)) = inner.entries.push(scope, entry) {
            if evicted != scope {
                inner.stats.evictions += 1;
                debug!("Evicted {evicted} from index cache");
            }
        }
        debug!("Cache miss for {scope}; loaded {} vectors", index.len());
        Ok(index)
    }

    /// Drop the scope's entry regardless of recency.
    pub fn invalidate(&self, scope: Scope) {
        let mut inner = self.inner.lock();
        inner.stats.invalidations += 1;
        if inner.entries.pop(&scope).is_some() {
            debug!("Invalidated cached {scope}");
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn contains(&self, scope: Scope) -> bool {
        self.inner.lock().entries.contains(&scope)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    fn lookup(&self, scope: Scope) -> Option<Arc<FlatIndex>> {
        let current = self.store.version(scope);
        let mut inner = self.inner.lock();
        let (version, index) = inner
            .entries
            .get(&scope)
            .map(|entry| (entry.version, Arc::clone(&entry.index)))?;
        if version < current {
            inner.entries.pop(&scope);
            inner.stats.invalidations += 1;
            debug!("Dropped stale cached {scope}");
            return None;
        }
        inner.stats.hits += 1;
        debug!("Cache hit for {scope}");
        Some(index)
    }
}
