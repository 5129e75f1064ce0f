//! Index store: on-disk persistence of one flat index per scope.
//!
//! Each scope's index lives in a single artifact at [`Scope::storage_key`].
//! Writes go to a temporary file that is renamed over the key once fully
//! written, so a reader sees either the previous artifact or the new one.
//!
//! Read-modify-write operations hold the scope's [`ScopeGuard`] for their
//! whole duration. Concurrent `add_batch` calls on one scope therefore never
//! lose vectors; calls on different scopes proceed in parallel.
//!
//! Every successful create, write or delete bumps the scope's
//! [`IndexStore::version`] before the guard is released. Readers holding a
//! decoded copy compare versions to detect that it went stale.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::{PixdexError, Result};
use crate::scope::Scope;
use crate::storage::Storage;
use crate::vector::FlatIndex;
use crate::vector::io::{from_bytes, to_bytes};

pub mod locks;

pub use self::locks::{ScopeGuard, ScopeLocks};

/// Persistence of per-scope vector indexes.
#[derive(Debug)]
pub struct IndexStore {
    storage: Arc<dyn Storage>,
    dimension: usize,
    locks: ScopeLocks,
    clock: AtomicU64,
    versions: Mutex<AHashMap<Scope, u64>>,
}

impl IndexStore {
    /// Create a store whose indexes all hold `dimension`-length vectors.
    pub fn new(storage: Arc<dyn Storage>, dimension: usize) -> Self {
        Self {
            storage,
            dimension,
            locks: ScopeLocks::new(),
            clock: AtomicU64::new(0),
            versions: Mutex::new(AHashMap::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Acquire the scope's write lock.
    pub fn lock(&self, scope: Scope) -> ScopeGuard {
        self.locks.lock(scope)
    }

    /// Forget lock entries of scopes nobody is using.
    pub fn prune_locks(&self) {
        self.locks.prune();
    }

    /// Version of the scope's last mutation through this store.
    ///
    /// Zero until the scope is first mutated. Versions only grow, and a
    /// deleted scope keeps its version, so a copy read at one version is
    /// current exactly while the version is unchanged.
    pub fn version(&self, scope: Scope) -> u64 {
        self.versions.lock().get(&scope).copied().unwrap_or(0)
    }

    fn bump_version(&self, scope: Scope) {
        let version = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        self.versions.lock().insert(scope, version);
    }

    /// Whether the scope has an index artifact.
    pub fn exists(&self, scope: Scope) -> bool {
        self.storage.file_exists(&scope.storage_key())
    }

    /// Write a new, empty index for the scope.
    ///
    /// Fails with `AlreadyExists` if the scope already has one.
    pub fn create(&self, scope: Scope) -> Result<()> {
        let guard = self.lock(scope);
        self.create_locked(&guard)
    }

    pub fn create_locked(&self, guard: &ScopeGuard) -> Result<()> {
        let scope = guard.scope();
        if self.exists(scope) {
            return Err(PixdexError::AlreadyExists(scope));
        }
        self.persist(scope, &FlatIndex::new(self.dimension))?;
        self.bump_version(scope);
        info!("Created index for {scope} (dimension {})", self.dimension);
        Ok(())
    }

    /// Read and decode the scope's index.
    pub fn load(&self, scope: Scope) -> Result<FlatIndex> {
        let key = scope.storage_key();
        let mut input = match self.storage.open_input(&key) {
            Ok(input) => input,
            Err(_) if !self.storage.file_exists(&key) => {
                return Err(PixdexError::NotFound(scope));
            }
            Err(e) => return Err(e),
        };

        let mut bytes = Vec::with_capacity(input.size()? as usize);
        input.read_to_end(&mut bytes)?;
        let index = from_bytes(&bytes)?;

        if index.dimension() != self.dimension {
            return Err(PixdexError::DimensionMismatch {
                expected: self.dimension,
                actual: index.dimension(),
            });
        }
        debug!("Loaded {scope} with {} vectors", index.len());
        Ok(index)
    }

    /// Add one vector. Fails with `NotFound` if the scope has no index.
    pub fn add(&self, scope: Scope, vector: &[f32], external_id: i64) -> Result<()> {
        self.add_batch(scope, &[vector.to_vec()], &[external_id])
            .map(|_| ())
    }

    /// Add many vectors in one read-modify-write cycle.
    ///
    /// Returns the number of ids new to the scope; rows for ids already
    /// present replace the stored vectors. An empty batch is a no-op.
    pub fn add_batch(
        &self,
        scope: Scope,
        vectors: &[Vec<f32>],
        external_ids: &[i64],
    ) -> Result<usize> {
        let guard = self.lock(scope);
        self.add_batch_locked(&guard, vectors, external_ids)
    }

    pub fn add_batch_locked(
        &self,
        guard: &ScopeGuard,
        vectors: &[Vec<f32>],
        external_ids: &[i64],
    ) -> Result<usize> {
        if vectors.len() != external_ids.len() {
            return Err(PixdexError::LengthMismatch {
                vectors: vectors.len(),
                ids: external_ids.len(),
            });
        }
        if vectors.is_empty() {
            return Ok(0);
        }

        let scope = guard.scope();
        let mut index = self.load(scope)?;
        let added = index.add_batch(external_ids, vectors)?;
        self.persist(scope, &index)?;
        self.bump_version(scope);

        info!(
            "Wrote {} vectors to {scope}, {added} new ({} total)",
            vectors.len(),
            index.len()
        );
        Ok(added)
    }

    /// Top `min(k, count)` matches in one scope, straight from storage.
    pub fn search(&self, scope: Scope, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        self.load(scope)?.search(query, k)
    }

    /// Remove the scope's artifact. Fails with `NotFound` if absent.
    pub fn delete(&self, scope: Scope) -> Result<()> {
        let guard = self.lock(scope);
        self.delete_locked(&guard)?;
        drop(guard);
        self.prune_locks();
        Ok(())
    }

    pub fn delete_locked(&self, guard: &ScopeGuard) -> Result<()> {
        let scope = guard.scope();
        let key = scope.storage_key();
        if !self.storage.file_exists(&key) {
            return Err(PixdexError::NotFound(scope));
        }
        self.storage.delete_file(&key)?;
        self.bump_version(scope);
        info!("Deleted index for {scope}");
        Ok(())
    }

    /// Number of vectors stored for the scope.
    pub fn count(&self, scope: Scope) -> Result<usize> {
        Ok(self.load(scope)?.len())
    }

    /// Every scope with an artifact, in key order.
    pub fn list_scopes(&self) -> Result<Vec<Scope>> {
        Ok(self
            .storage
            .list_files()?
            .iter()
            .filter_map(|name| Scope::from_storage_key(name))
            .collect())
    }

    /// Write to a temporary file, then rename over the canonical key.
    fn persist(&self, scope: Scope, index: &FlatIndex) -> Result<()> {
        let key = scope.storage_key();
        let bytes = to_bytes(index)?;
        let (temp_name, mut output) = self.storage.create_temp_output(&key)?;

        let written = output
            .write_all(&bytes)
            .map_err(PixdexError::from)
            .and_then(|_| output.close());
        drop(output);

        if let Err(e) = written.and_then(|_| self.storage.rename_file(&temp_name, &key)) {
            if let Err(cleanup) = self.storage.delete_file(&temp_name) {
                warn!("Failed to remove temporary file {temp_name}: {cleanup}");
            }
            return Err(e);
        }
        Ok(())
    }
}
