//! Per-scope mutual exclusion.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::scope::Scope;

/// Tables larger than this drop idle entries on the next `lock`.
const PRUNE_THRESHOLD: usize = 1024;

/// A table of mutexes keyed by scope.
///
/// Every read-modify-write of a scope's artifact runs while holding that
/// scope's [`ScopeGuard`]. Distinct scopes use distinct mutexes and never
/// contend.
#[derive(Debug, Default)]
pub struct ScopeLocks {
    table: Mutex<AHashMap<Scope, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the scope's mutex is held.
    pub fn lock(&self, scope: Scope) -> ScopeGuard {
        let mutex = {
            let mut table = self.table.lock();
            if table.len() > PRUNE_THRESHOLD {
                prune_idle(&mut table);
            }
            Arc::clone(table.entry(scope).or_default())
        };
        // The table lock is released before blocking on the scope.
        ScopeGuard {
            scope,
            _guard: mutex.lock_arc(),
        }
    }

    /// Drop table entries nobody holds or waits on.
    pub fn prune(&self) {
        prune_idle(&mut self.table.lock());
    }

    /// Number of entries currently in the table.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

fn prune_idle(table: &mut AHashMap<Scope, Arc<Mutex<()>>>) {
    table.retain(|_, mutex| Arc::strong_count(mutex) > 1);
}

/// Proof that the current thread holds a scope's lock.
///
/// The `*_locked` operations on [`IndexStore`](crate::store::IndexStore)
/// take a guard instead of a scope, so callers can extend one critical
/// section over several steps (write, then cache invalidation).
pub struct ScopeGuard {
    scope: Scope,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl ScopeGuard {
    /// The scope this guard protects.
    pub fn scope(&self) -> Scope {
        self.scope
    }
}

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_scope_is_exclusive() {
        let locks = Arc::new(ScopeLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    let _guard = locks.lock(Scope::new(1, 1));
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_scopes_do_not_contend() {
        let locks = ScopeLocks::new();
        let a = locks.lock(Scope::new(1, 1));
        let b = locks.lock(Scope::new(2, 1));
        assert_eq!(a.scope(), Scope::new(1, 1));
        assert_eq!(b.scope(), Scope::new(2, 1));
        assert_eq!(locks.len(), 2);
        assert_eq!(format!("{a:?}"), format!("ScopeGuard {{ scope: {:?}, .. }}", a.scope()));
    }

    #[test]
    fn test_prune_keeps_held_entries() {
        let locks = ScopeLocks::new();
        let held = locks.lock(Scope::new(1, 1));
        drop(locks.lock(Scope::new(1, 2)));

        locks.prune();
        assert_eq!(locks.len(), 1);

        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
