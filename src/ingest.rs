//! Batched ingestion into one scope.
//!
//! [`BatchIngestor::ingest`] embeds every item first, in provider-sized
//! batches, and only then commits: one `add_batch` read-modify-write for
//! the whole set followed by a cache invalidation, both under the scope's
//! lock. An embedding failure, a timeout, or dropping the future before the
//! commit leaves the store untouched.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cache::IndexCache;
use crate::embedding::Embedder;
use crate::error::{PixdexError, Result};
use crate::scope::Scope;
use crate::store::IndexStore;

/// Default number of images per provider call.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// One item to index: its caller-level id and raw encoded content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestItem {
    pub external_id: i64,
    pub content: Vec<u8>,
}

impl IngestItem {
    pub fn new(external_id: i64, content: Vec<u8>) -> Self {
        Self {
            external_id,
            content,
        }
    }
}

/// Embeds and commits batches of items.
#[derive(Debug, Clone)]
pub struct BatchIngestor {
    store: Arc<IndexStore>,
    cache: Arc<IndexCache>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    timeout: Option<Duration>,
}

impl BatchIngestor {
    /// A `batch_size` of zero is treated as one.
    pub fn new(
        store: Arc<IndexStore>,
        cache: Arc<IndexCache>,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            cache,
            embedder,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    /// Embed `items` and add them to `scope`. Returns the number of ids new
    /// to the scope.
    ///
    /// Fails with `NotFound` before any embedding work if the scope has no
    /// index.
    pub async fn ingest(&self, scope: Scope, items: &[IngestItem]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        if !self.store.exists(scope) {
            return Err(PixdexError::NotFound(scope));
        }

        let vectors = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.embed_all(items))
                .await
                .map_err(|_| {
                    PixdexError::timeout(format!(
                        "embedding {} items for {scope} exceeded {limit:?}",
                        items.len()
                    ))
                })??,
            None => self.embed_all(items).await?,
        };
        let external_ids: Vec<i64> = items.iter().map(|item| item.external_id).collect();

        let ingestor = self.clone();
        tokio::task::spawn_blocking(move || ingestor.ingest_vectors(scope, &external_ids, &vectors))
            .await
            .map_err(|e| PixdexError::cancelled(format!("ingest commit for {scope}: {e}")))?
    }

    /// Commit pre-computed vectors to `scope`.
    ///
    /// Holds the scope lock across the store write and the cache
    /// invalidation.
    pub fn ingest_vectors(
        &self,
        scope: Scope,
        external_ids: &[i64],
        vectors: &[Vec<f32>],
    ) -> Result<usize> {
        let guard = self.store.lock(scope);
        let added = self.store.add_batch_locked(&guard, vectors, external_ids)?;
        if !vectors.is_empty() {
            self.cache.invalidate(scope);
        }
        drop(guard);

        info!("Ingested {added} vectors into {scope}");
        Ok(added)
    }

    async fn embed_all(&self, items: &[IngestItem]) -> Result<Vec<Vec<f32>>> {
        let batches = items.chunks(self.batch_size).map(|chunk| async move {
            let images: Vec<&[u8]> = chunk.iter().map(|item| item.content.as_slice()).collect();
            let vectors = self.embedder.embed_images_batch(&images).await?;
            if vectors.len() != chunk.len() {
                return Err(PixdexError::embedding(format!(
                    "{} returned {} vectors for {} images",
                    self.embedder.name(),
                    vectors.len(),
                    chunk.len()
                )));
            }
            Ok(vectors)
        });

        let embedded = try_join_all(batches).await?;
        debug!(
            "Embedded {} items in {} batches with {}",
            items.len(),
            embedded.len(),
            self.embedder.name()
        );
        Ok(embedded.into_iter().flatten().collect())
    }
}
