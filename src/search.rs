//! Federated search across many per-scope indexes.
//!
//! A query is normalized once, run against every accessible scope through
//! the [`IndexCache`], and the per-scope results are merged into one global
//! top-k by [`TopKMerger`].
//!
//! Scopes whose collection has no known owner, or whose index does not
//! exist, are skipped with a warning. A search that finds nothing anywhere
//! returns an empty list. Only configuration-class failures (query
//! dimension), storage failures, and embedding failures reach the caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::IndexCache;
use crate::embedding::Embedder;
use crate::error::{PixdexError, Result};
use crate::scope::{Scope, ScopeResolver};
use crate::vector::flat::prepare_query;

pub mod merger;

pub use self::merger::{SearchHit, TopKMerger};

/// Scope counts above this are searched with rayon.
const PARALLEL_SCOPE_THRESHOLD: usize = 8;

/// Per-call accounting of a federated search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Distinct collections requested.
    pub scopes_requested: usize,
    /// Scopes whose index was searched.
    pub scopes_searched: usize,
    /// Scopes skipped for a missing owner or a missing index.
    pub scopes_skipped: usize,
    /// Local candidates offered to the merge.
    pub candidates_merged: usize,
}

/// Hits ordered best first, plus how they were obtained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FederatedSearchResults {
    pub hits: Vec<SearchHit>,
    pub stats: SearchStats,
}

impl FederatedSearchResults {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

enum ScopeOutcome {
    Searched(Scope, Vec<(i64, f32)>),
    Skipped,
}

/// Stateless federated query executor.
#[derive(Debug, Clone)]
pub struct FederatedSearcher {
    cache: Arc<IndexCache>,
}

impl FederatedSearcher {
    pub fn new(cache: Arc<IndexCache>) -> Self {
        Self { cache }
    }

    /// Global top-k for a query vector over the given collections.
    ///
    /// `resolver` maps each collection to the owner whose namespace holds
    /// its index. Duplicate collection ids are searched once.
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
        let mut query = query.to_vec();
        prepare_query(&mut query, self.cache.store().dimension())?;

        let mut seen = HashSet::with_capacity(collections.len());
        let collections: Vec<u64> = collections
            .iter()
            .copied()
            .filter(|c| seen.insert(*c))
            .collect();

        let mut stats = SearchStats {
            scopes_requested: collections.len(),
            ..SearchStats::default()
        };
        if k == 0 || collections.is_empty() {
            return Ok(FederatedSearchResults {
                hits: Vec::new(),
                stats,
            });
        }

        let outcomes: Vec<Result<ScopeOutcome>> =
            if collections.len() > PARALLEL_SCOPE_THRESHOLD {
                collections
                    .par_iter()
                    .map(|&collection_id| self.search_scope(&query, collection_id, resolver, k))
                    .collect()
            } else {
                collections
                    .iter()
                    .map(|&collection_id| self.search_scope(&query, collection_id, resolver, k))
                    .collect()
            };

        let mut merger = TopKMerger::new(k);
        for outcome in outcomes {
            match outcome? {
                ScopeOutcome::Searched(scope, local) => {
                    stats.scopes_searched += 1;
                    merger.extend_from_scope(scope, &local);
                }
                ScopeOutcome::Skipped => stats.scopes_skipped += 1,
            }
        }
        stats.candidates_merged = merger.candidates_seen();

        let hits = merger.into_sorted_vec();
        debug!(
            "Federated search over {} scopes returned {} hits ({} skipped)",
            stats.scopes_requested,
            hits.len(),
            stats.scopes_skipped
        );
        Ok(FederatedSearchResults { hits, stats })
    }

    /// Embed `text` once, then run [`FederatedSearcher::search_vector`].
    ///
    /// The embedding call is the only unbounded step; `timeout` bounds it.
    pub async fn search_text<R>(
        &self,
        embedder: &dyn Embedder,
        text: &str,
        collections: &[u64],
        resolver: &R,
        k: usize,
        timeout: Option<Duration>,
    ) -> Result<FederatedSearchResults>
    where
        R: ScopeResolver + ?Sized,
    {
        let query = match timeout {
            Some(limit) => tokio::time::timeout(limit, embedder.embed_text(text))
                .await
                .map_err(|_| {
                    PixdexError::timeout(format!(
                        "{} did not embed the query within {limit:?}",
                        embedder.name()
                    ))
                })??,
            None => embedder.embed_text(text).await?,
        };
        self.search_vector(&query, collections, resolver, k)
    }

    fn search_scope<R>(
        &self,
        query: &[f32],
        collection_id: u64,
        resolver: &R,
        k: usize,
    ) -> Result<ScopeOutcome>
    where
        R: ScopeResolver + ?Sized,
    {
        let loaded = resolver
            .scope_of(collection_id)
            .and_then(|scope| Ok((scope, self.cache.get_or_load(scope)?)));

        match loaded {
            Ok((scope, index)) => Ok(ScopeOutcome::Searched(
                scope,
                index.search_normalized(query, k),
            )),
            Err(e) if e.is_skippable() => {
                warn!("Skipping collection {collection_id} in federated search: {e}");
                Ok(ScopeOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }
}
