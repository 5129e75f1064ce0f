//! Caller-facing facade over store, cache, search and ingestion.
//!
//! [`SearchService`] wires one [`IndexStore`], one shared [`IndexCache`],
//! the [`FederatedSearcher`] and the [`BatchIngestor`] together and exposes
//! the operations an HTTP layer or the CLI needs. Every mutation goes
//! through a path that invalidates the cache under the scope lock.
//!
//! Failed deletions and ingests that may succeed later wait in retry queues
//! until the matching `retry_failed_*` pass succeeds or gives up on them.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::cache::{CacheStats, IndexCache};
use crate::config::PixdexConfig;
use crate::embedding::Embedder;
use crate::error::{PixdexError, Result};
use crate::ingest::{BatchIngestor, IngestItem};
use crate::scope::{Scope, ScopeResolver};
use crate::search::{FederatedSearchResults, FederatedSearcher};
use crate::storage::Storage;
use crate::storage::file::FileStorage;
use crate::store::IndexStore;

pub mod deletions;
pub mod ingests;

pub use self::deletions::{DeletionQueue, PendingDeletion, RetryReport};
pub use self::ingests::{IngestQueue, PendingIngest};

/// Multi-tenant index management and federated search.
#[derive(Debug)]
pub struct SearchService {
    config: PixdexConfig,
    store: Arc<IndexStore>,
    cache: Arc<IndexCache>,
    searcher: FederatedSearcher,
    ingestor: BatchIngestor,
    embedder: Arc<dyn Embedder>,
    deletions: DeletionQueue,
    ingests: Arc<IngestQueue>,
}

impl SearchService {
    /// Open a service whose indexes live under `config.index_dir`.
    pub fn open(config: PixdexConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let storage = FileStorage::new(&config.index_dir, config.storage_config())?;
        Self::with_storage(config, Arc::new(storage), embedder)
    }

    /// Build a service over any storage backend.
    pub fn with_storage(
        config: PixdexConfig,
        storage: Arc<dyn Storage>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != config.dimension {
            return Err(PixdexError::DimensionMismatch {
                expected: config.dimension,
                actual: embedder.dimension(),
            });
        }

        let store = Arc::new(IndexStore::new(storage, config.dimension));
        let cache = Arc::new(IndexCache::new(Arc::clone(&store), config.cache_capacity));
        let searcher = FederatedSearcher::new(Arc::clone(&cache));
        let ingestor = BatchIngestor::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&embedder),
            config.embed_batch_size,
            config.embed_timeout(),
        );
        let deletions = DeletionQueue::new(config.max_delete_retries);
        let ingests = Arc::new(IngestQueue::new(config.max_ingest_retries));

        info!(
            "Search service ready (dimension {}, cache capacity {}, embedder {})",
            config.dimension,
            config.cache_capacity,
            embedder.name()
        );
        Ok(Self {
            config,
            store,
            cache,
            searcher,
            ingestor,
            embedder,
            deletions,
            ingests,
        })
    }

    pub fn config(&self) -> &PixdexConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.cache
    }

    /// Create the empty index of a new collection.
    pub fn create_scope(&self, owner_id: u64, collection_id: u64) -> Result<()> {
        self.store.create(Scope::new(owner_id, collection_id))
    }

    /// Create the index unless it already exists. Returns whether it was
    /// created.
    pub fn ensure_scope(&self, owner_id: u64, collection_id: u64) -> Result<bool> {
        let guard = self.store.lock(Scope::new(owner_id, collection_id));
        if self.store.exists(guard.scope()) {
            return Ok(false);
        }
        self.store.create_locked(&guard)?;
        Ok(true)
    }

    /// Embed and index a batch of items.
    ///
    /// A retryable failure queues the items for
    /// [`SearchService::retry_failed_ingests`] before the error is returned.
    pub async fn ingest(
        &self,
        owner_id: u64,
        collection_id: u64,
        items: Vec<IngestItem>,
    ) -> Result<usize> {
        let scope = Scope::new(owner_id, collection_id);
        let result = self.ingestor.ingest(scope, &items).await;
        if let Err(e) = &result {
            record_failed_ingest(&self.ingests, scope, items, e);
        }
        result
    }

    /// Index vectors that were embedded elsewhere.
    pub fn ingest_vectors(
        &self,
        owner_id: u64,
        collection_id: u64,
        external_ids: &[i64],
        vectors: &[Vec<f32>],
    ) -> Result<usize> {
        self.ingestor
            .ingest_vectors(Scope::new(owner_id, collection_id), external_ids, vectors)
    }

    /// Run [`SearchService::ingest`] on a background task.
    ///
    /// Must be called within a tokio runtime. Failures are logged, queued
    /// like those of `ingest`, and also returned through the handle.
    pub fn spawn_ingest(
        &self,
        owner_id: u64,
        collection_id: u64,
        items: Vec<IngestItem>,
    ) -> JoinHandle<Result<usize>> {
        let ingestor = self.ingestor.clone();
        let ingests = Arc::clone(&self.ingests);
        let scope = Scope::new(owner_id, collection_id);
        tokio::spawn(async move {
            let result = ingestor.ingest(scope, &items).await;
            if let Err(e) = &result {
                error!("Background ingest into {scope} failed: {e}");
                record_failed_ingest(&ingests, scope, items, e);
            }
            result
        })
    }

    /// Retry every queued ingest once.
    pub async fn retry_failed_ingests(&self) -> RetryReport {
        let ingestor = &self.ingestor;
        self.ingests
            .retry(|scope, items| async move { ingestor.ingest(scope, &items).await })
            .await
    }

    pub fn pending_ingests(&self) -> Vec<PendingIngest> {
        self.ingests.pending()
    }

    /// Federated search for a text query.
    pub async fn search<R>(
        &self,
        query_text: &str,
        collections: &[u64],
        resolver: &R,
        k: usize,
    ) -> Result<FederatedSearchResults>
    where
        R: ScopeResolver + ?Sized,
    {
        self.searcher
            .search_text(
                self.embedder.as_ref(),
                query_text,
                collections,
                resolver,
                k,
                self.config.embed_timeout(),
            )
            .await
    }

    /// Federated search for a pre-computed query vector.
    pub fn search_vector<R>(
        &self,
        query: &[f32],
        collections: &[u64],
        resolver: &R,
        k: usize,
    ) -> Result<FederatedSearchResults>
    where
        R: ScopeResolver + ?Sized,
    {
        self.searcher.search_vector(query, collections, resolver, k)
    }

    /// Delete a collection's index. Fails with `NotFound` if it has none.
    pub fn delete_scope(&self, owner_id: u64, collection_id: u64) -> Result<()> {
        let scope = Scope::new(owner_id, collection_id);
        let guard = self.store.lock(scope);
        self.store.delete_locked(&guard)?;
        self.cache.invalidate(scope);
        drop(guard);
        self.store.prune_locks();
        Ok(())
    }

    /// Delete as one step of a larger teardown.
    ///
    /// Failures are logged, and any failure other than a missing index is
    /// queued for [`SearchService::retry_failed_deletions`]. The result is
    /// still returned so the caller can choose to ignore it.
    pub fn delete_scope_best_effort(&self, owner_id: u64, collection_id: u64) -> Result<()> {
        let scope = Scope::new(owner_id, collection_id);
        let result = self.delete_scope(owner_id, collection_id);
        match &result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!("No index to delete for {scope}");
            }
            Err(e) => {
                warn!("Failed to delete index for {scope}: {e}");
                self.deletions.record(scope, e);
            }
        }
        result
    }

    /// Retry every queued deletion once.
    pub fn retry_failed_deletions(&self) -> RetryReport {
        self.deletions
            .retry(|scope| self.delete_scope(scope.owner_id, scope.collection_id))
    }

    pub fn pending_deletions(&self) -> Vec<PendingDeletion> {
        self.deletions.pending()
    }

    pub fn list_scopes(&self) -> Result<Vec<Scope>> {
        self.store.list_scopes()
    }

    /// Number of vectors indexed for a collection.
    pub fn count(&self, owner_id: u64, collection_id: u64) -> Result<usize> {
        Ok(self
            .cache
            .get_or_load(Scope::new(owner_id, collection_id))?
            .len())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn record_failed_ingest(
    queue: &IngestQueue,
    scope: Scope,
    items: Vec<IngestItem>,
    err: &PixdexError,
) {
    if err.is_retryable() {
        queue.record(scope, items, err);
    }
}
