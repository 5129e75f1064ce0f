//! # pixdex
//!
//! Multi-tenant embedding index management and federated similarity search.
//!
//! Every `(owner, collection)` scope owns one flat inner-product index,
//! persisted as a single artifact and kept resident through an LRU cache.
//! Queries fan out over many scopes, possibly owned by different accounts,
//! and merge into one global top-k.
//!
//! ## Features
//!
//! - Atomic per-scope index writes over pluggable storage
//! - Per-scope locking so concurrent ingests never lose vectors
//! - LRU index cache that stays coherent with every mutation
//! - Bounded-heap federated merge with a deterministic tie-break
//! - Batched, cancellable ingestion through an async embedding provider
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use pixdex::config::PixdexConfig;
//! use pixdex::embedding::PrecomputedEmbedder;
//! use pixdex::scope::OwnerMap;
//! use pixdex::service::SearchService;
//! use pixdex::storage::memory::MemoryStorage;
//!
//! # fn main() -> pixdex::error::Result<()> {
//! let config = PixdexConfig {
//!     dimension: 2,
//!     ..PixdexConfig::default()
//! };
//! let service = SearchService::with_storage(
//!     config,
//!     Arc::new(MemoryStorage::new_default()),
//!     Arc::new(PrecomputedEmbedder::new(2)),
//! )?;
//!
//! service.create_scope(1, 10)?;
//! service.ingest_vectors(1, 10, &[100, 101], &[vec![1.0, 0.0], vec![0.0, 1.0]])?;
//!
//! let owners: OwnerMap = "10:1".parse()?;
//! let results = service.search_vector(&[0.9, 0.1], &[10], &owners, 1)?;
//! assert_eq!(results.hits[0].external_id, 100);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod scope;
pub mod search;
pub mod service;
pub mod storage;
pub mod store;
pub mod vector;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
