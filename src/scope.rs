//! Scope identity and owner resolution.
//!
//! A [`Scope`] names one physical index: the collection it indexes and the
//! account that owns it. Indexes live under the owner's namespace, so a
//! search issued by another account through a sharing grant still needs the
//! owner id to find the artifact. [`ScopeResolver`] supplies that mapping.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PixdexError, Result};

/// File extension used for index artifacts.
pub const INDEX_EXTENSION: &str = "pxdx";

/// The `(owner_id, collection_id)` pair identifying one vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    /// Account that owns the collection.
    pub owner_id: u64,
    /// Collection ("folder") indexed by this scope.
    pub collection_id: u64,
}

impl Scope {
    pub fn new(owner_id: u64, collection_id: u64) -> Self {
        Self {
            owner_id,
            collection_id,
        }
    }

    /// Canonical storage key of this scope's index artifact.
    ///
    /// Both ids take part in the key, so two owners may reuse a collection id
    /// without colliding.
    pub fn storage_key(&self) -> String {
        format!(
            "{}/{}.{INDEX_EXTENSION}",
            self.owner_id, self.collection_id
        )
    }

    /// Inverse of [`Scope::storage_key`]. Returns `None` for foreign keys.
    pub fn from_storage_key(key: &str) -> Option<Self> {
        let (owner, file) = key.split_once('/')?;
        let collection = file.strip_suffix(INDEX_EXTENSION)?.strip_suffix('.')?;
        Some(Self::new(owner.parse().ok()?, collection.parse().ok()?))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scope(owner={}, collection={})",
            self.owner_id, self.collection_id
        )
    }
}

/// Maps a collection id to the account that owns its index.
///
/// Implementations reflect access-control decisions made elsewhere; a
/// collection the caller may not touch simply has no owner here.
pub trait ScopeResolver: Send + Sync {
    /// Owner of `collection_id`, if the caller may search it.
    fn owner_of(&self, collection_id: u64) -> Option<u64>;

    /// Resolve a collection into a scope.
    fn scope_of(&self, collection_id: u64) -> Result<Scope> {
        self.owner_of(collection_id)
            .map(|owner| Scope::new(owner, collection_id))
            .ok_or(PixdexError::InvalidOwnerMapping(collection_id))
    }
}

/// A plain `collection_id -> owner_id` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerMap {
    owners: HashMap<u64, u64>,
}

impl OwnerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `owner_id` owns `collection_id`.
    pub fn insert(&mut self, collection_id: u64, owner_id: u64) -> Option<u64> {
        self.owners.insert(collection_id, owner_id)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Split `collections` into resolvable scopes and unresolvable ids,
    /// preserving request order in both.
    pub fn resolve(&self, collections: &[u64]) -> (Vec<Scope>, Vec<u64>) {
        let mut scopes = Vec::with_capacity(collections.len());
        let mut missing = Vec::new();
        for &collection_id in collections {
            match self.owner_of(collection_id) {
                Some(owner) => scopes.push(Scope::new(owner, collection_id)),
                None => missing.push(collection_id),
            }
        }
        (scopes, missing)
    }
}

impl ScopeResolver for OwnerMap {
    fn owner_of(&self, collection_id: u64) -> Option<u64> {
        self.owners.get(&collection_id).copied()
    }
}

impl FromIterator<(u64, u64)> for OwnerMap {
    fn from_iter<I: IntoIterator<Item = (u64, u64)>>(iter: I) -> Self {
        Self {
            owners: iter.into_iter().collect(),
        }
    }
}

impl FromStr for OwnerMap {
    type Err = PixdexError;

    /// Parse `"collection:owner,collection:owner"`.
    fn from_str(s: &str) -> Result<Self> {
        let mut map = OwnerMap::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (collection, owner) = pair.split_once(':').ok_or_else(|| {
                PixdexError::invalid_argument(format!("expected collection:owner, got '{pair}'"))
            })?;
            let collection = collection.trim().parse::<u64>().map_err(|e| {
                PixdexError::invalid_argument(format!("bad collection id '{collection}': {e}"))
            })?;
            let owner = owner.trim().parse::<u64>().map_err(|e| {
                PixdexError::invalid_argument(format!("bad owner id '{owner}': {e}"))
            })?;
            map.insert(collection, owner);
        }
        Ok(map)
    }
}
