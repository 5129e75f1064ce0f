//! Bounded top-k merging of per-scope results.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::scope::Scope;
use crate::vector::core::rank_order;

/// One ranked match from a federated search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Caller-supplied id of the matched item.
    pub external_id: i64,
    /// Cosine similarity to the query.
    pub score: f32,
    /// Collection whose index produced the match.
    pub collection_id: u64,
    /// Owner of that collection's index.
    pub owner_id: u64,
}

impl SearchHit {
    pub fn new(scope: Scope, external_id: i64, score: f32) -> Self {
        Self {
            external_id,
            score,
            collection_id: scope.collection_id,
            owner_id: scope.owner_id,
        }
    }

    /// Scope that produced this hit.
    pub fn scope(&self) -> Scope {
        Scope::new(self.owner_id, self.collection_id)
    }

    /// Total result order: `Less` means `self` ranks ahead of `other`.
    ///
    /// Higher score first, then lower external id, then lower collection id.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        rank_order(self.score, self.external_id, other.score, other.external_id)
            .then_with(|| self.collection_id.cmp(&other.collection_id))
            .then_with(|| self.owner_id.cmp(&other.owner_id))
    }
}

/// Heap entry where a better hit compares greater.
#[derive(Debug, Clone, Copy)]
struct Ranked(SearchHit);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.rank_cmp(&self.0)
    }
}

/// A min-heap holding the best `k` hits pushed so far.
///
/// While under capacity every hit is kept. At capacity a new hit replaces
/// the current worst only if it ranks ahead of it, so a merge over `n`
/// candidates costs `O(n log k)`.
#[derive(Debug)]
pub struct TopKMerger {
    k: usize,
    heap: BinaryHeap<Reverse<Ranked>>,
    pushed: usize,
}

impl TopKMerger {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k),
            pushed: 0,
        }
    }

    /// Offer one candidate. Returns whether it was kept.
    pub fn push(&mut self, hit: SearchHit) -> bool {
        self.pushed += 1;
        if self.k == 0 {
            return false;
        }

        let candidate = Ranked(hit);
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
            return true;
        }

        match self.heap.peek_mut() {
            Some(mut worst) if candidate > worst.0 => {
                *worst = Reverse(candidate);
                true
            }
            _ => false,
        }
    }

    /// Offer every candidate from one scope's local result.
    pub fn extend_from_scope(&mut self, scope: Scope, local: &[(i64, f32)]) {
        for &(external_id, score) in local {
            self.push(SearchHit::new(scope, external_id, score));
        }
    }

    /// Score of the worst hit kept, once the heap is full.
    pub fn threshold(&self) -> Option<f32> {
        if self.heap.len() < self.k {
            return None;
        }
        self.heap.peek().map(|worst| worst.0.0.score)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Total candidates offered, kept or not.
    pub fn candidates_seen(&self) -> usize {
        self.pushed
    }

    /// Drain into a list ordered best first.
    pub fn into_sorted_vec(self) -> Vec<SearchHit> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(Ranked(hit))| hit)
            .collect()
    }
}
