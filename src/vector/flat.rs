//! Flat vector index for exact inner-product search.

use ahash::AHashMap;
use rayon::prelude::*;

use crate::error::{PixdexError, Result};
use crate::vector::core::{
    inner_product, normalize, normalize_rows, normalized, rank_order, validate_dimension,
    validate_finite,
};

/// Scans above this many vectors score in parallel.
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// An ordered set of `(external_id, unit vector)` pairs searched by brute force.
///
/// Vectors are stored row-major in one contiguous buffer. External ids are
/// unique within the index: adding an id that is already present replaces
/// its vector in place.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    ids: Vec<i64>,
    data: Vec<f32>,
    positions: AHashMap<i64, usize>,
}

impl FlatIndex {
    /// Create an empty index.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
            positions: AHashMap::new(),
        }
    }

    /// Rebuild an index from decoded parts. Rows are taken as stored.
    pub(crate) fn from_parts(dimension: usize, ids: Vec<i64>, data: Vec<f32>) -> Result<Self> {
        if ids.len().checked_mul(dimension) != Some(data.len()) {
            return Err(PixdexError::corrupted(format!(
                "{} ids do not match {} values at dimension {dimension}",
                ids.len(),
                data.len()
            )));
        }

        let mut positions = AHashMap::with_capacity(ids.len());
        for (position, &id) in ids.iter().enumerate() {
            if positions.insert(id, position).is_some() {
                return Err(PixdexError::corrupted(format!(
                    "duplicate external id {id}"
                )));
            }
        }

        Ok(Self {
            dimension,
            ids,
            data,
            positions,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// External ids in insertion order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Row-major vector data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn contains(&self, external_id: i64) -> bool {
        self.positions.contains_key(&external_id)
    }

    /// Stored (normalized) vector at `position`.
    pub fn reconstruct(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Stored (normalized) vector for `external_id`.
    pub fn get(&self, external_id: i64) -> Option<&[f32]> {
        self.positions
            .get(&external_id)
            .and_then(|&position| self.reconstruct(position))
    }

    /// Normalize and add one vector.
    pub fn add(&mut self, external_id: i64, vector: &[f32]) -> Result<()> {
        self.add_batch(&[external_id], &[vector.to_vec()])
            .map(|_| ())
    }

    /// Normalize and add many vectors.
    ///
    /// Every row is validated before the index changes, so a bad row leaves
    /// the index untouched. Returns the number of ids that were not already
    /// present; rows for existing ids replace them and are not counted.
    pub fn add_batch(&mut self, external_ids: &[i64], vectors: &[Vec<f32>]) -> Result<usize> {
        if external_ids.len() != vectors.len() {
            return Err(PixdexError::LengthMismatch {
                vectors: vectors.len(),
                ids: external_ids.len(),
            });
        }
        if vectors.is_empty() {
            return Ok(0);
        }

        for (vector, &id) in vectors.iter().zip(external_ids) {
            validate_dimension(vector, self.dimension)?;
            validate_finite(vector, id)?;
        }

        let mut rows: Vec<f32> = Vec::with_capacity(vectors.len() * self.dimension);
        for vector in vectors {
            rows.extend_from_slice(vector);
        }
        normalize_rows(&mut rows, self.dimension);

        let before = self.ids.len();
        for (row, &id) in rows.chunks(self.dimension).zip(external_ids) {
            match self.positions.get(&id) {
                Some(&position) => {
                    let start = position * self.dimension;
                    self.data[start..start + self.dimension].copy_from_slice(row);
                }
                None => {
                    self.positions.insert(id, self.ids.len());
                    self.ids.push(id);
                    self.data.extend_from_slice(row);
                }
            }
        }

        Ok(self.ids.len() - before)
    }

    /// Exact top-k by inner product.
    ///
    /// The query is normalized first. Returns `min(k, len)` pairs sorted by
    /// descending score; equal scores order by ascending external id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        validate_dimension(query, self.dimension)?;
        let query = normalized(query);
        Ok(self.search_normalized(&query, k))
    }

    /// Like [`FlatIndex::search`] for a query that is already unit length.
    pub(crate) fn search_normalized(&self, query: &[f32], k: usize) -> Vec<(i64, f32)> {
        let local_k = k.min(self.len());
        if local_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(i64, f32)> = if self.len() > PARALLEL_SCAN_THRESHOLD {
            self.data
                .par_chunks(self.dimension)
                .zip(self.ids.par_iter())
                .map(|(row, &id)| (id, inner_product(query, row)))
                .collect()
        } else {
            self.data
                .chunks(self.dimension)
                .zip(self.ids.iter())
                .map(|(row, &id)| (id, inner_product(query, row)))
                .collect()
        };

        let order = |a: &(i64, f32), b: &(i64, f32)| rank_order(a.1, a.0, b.1, b.0);
        if local_k < scored.len() {
            scored.select_nth_unstable_by(local_k - 1, order);
            scored.truncate(local_k);
        }
        scored.sort_unstable_by(order);
        scored
    }
}

/// Normalize a query in place after checking its dimension.
pub(crate) fn prepare_query(query: &mut [f32], dimension: usize) -> Result<()> {
    validate_dimension(query, dimension)?;
    normalize(query);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::core::l2_norm;

    fn sample_index() -> FlatIndex {
        let mut index = FlatIndex::new(3);
        index
            .add_batch(
                &[10, 20, 30],
                &[
                    vec![1.0, 0.0, 0.0],
                    vec![0.0, 2.0, 0.0],
                    vec![1.0, 1.0, 0.0],
                ],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_stored_vectors_are_unit_length() {
        let index = sample_index();
        for position in 0..index.len() {
            let row = index.reconstruct(position).unwrap();
            assert!((l2_norm(row) - 1.0).abs() < 1e-6);
        }
        assert!((l2_norm(index.get(20).unwrap()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_orders_by_score() {
        let index = sample_index();
        let hits = index.search(&[1.0, 0.1, 0.0], 3).unwrap();
        let ids: Vec<i64> = hits.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![10, 30, 20]);
        assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_search_returns_at_most_len() {
        let index = sample_index();
        assert_eq!(index.search(&[0.0, 1.0, 0.0], 10).unwrap().len(), 3);
        assert!(index.search(&[0.0, 1.0, 0.0], 0).unwrap().is_empty());
        assert!(FlatIndex::new(3).search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_self_similarity() {
        let index = sample_index();
        let hits = index.search(&[0.0, 7.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].0, 20);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_equal_scores_prefer_lower_id() {
        let mut index = FlatIndex::new(2);
        index
            .add_batch(&[9, 4, 6], &[vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]])
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![4, 6]);
    }

    #[test]
    fn test_add_existing_id_replaces() {
        let mut index = sample_index();
        index.add(10, &[0.0, 0.0, 5.0]).unwrap();
        assert_eq!(index.len(), 3);
        let hits = index.search(&[0.0, 0.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].0, 10);
    }

    #[test]
    fn test_add_batch_counts_only_new_ids() {
        let mut index = sample_index();
        let added = index
            .add_batch(
                &[10, 77, 77],
                &[vec![0.0, 0.0, 1.0], vec![1.0, 1.0, 0.0], vec![0.0, 1.0, 1.0]],
            )
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(index.len(), 4);
        // The last row for a repeated id wins.
        let stored = index.get(77).unwrap();
        assert!(stored[0].abs() < 1e-6);
    }

    #[test]
    fn test_add_batch_errors_leave_index_untouched() {
        let mut index = sample_index();

        match index.add_batch(&[1, 2], &[vec![1.0, 0.0, 0.0]]) {
            Err(PixdexError::LengthMismatch { vectors: 1, ids: 2 }) => {}
            other => panic!("unexpected {other:?}"),
        }

        let result = index.add_batch(&[1, 2], &[vec![1.0, 0.0, 0.0], vec![1.0, 0.0]]);
        assert!(matches!(
            result,
            Err(PixdexError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert_eq!(index.len(), 3);
        assert!(!index.contains(1));

        assert_eq!(index.add_batch(&[], &[]).unwrap(), 0);
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = sample_index();
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(PixdexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_parallel_scan_matches_serial_ranking() {
        let dimension = 4;
        let count = PARALLEL_SCAN_THRESHOLD + 100;
        let ids: Vec<i64> = (0..count as i64).collect();
        let vectors: Vec<Vec<f32>> = ids
            .iter()
            .map(|&i| vec![(i % 17) as f32 + 1.0, (i % 5) as f32, 1.0, (i % 3) as f32])
            .collect();
        let mut index = FlatIndex::new(dimension);
        index.add_batch(&ids, &vectors).unwrap();

        let query = [1.0, 0.5, 0.25, 0.0];
        let hits = index.search(&query, 5).unwrap();
        assert_eq!(hits.len(), 5);

        let q = normalized(&query);
        let mut expected: Vec<(i64, f32)> = (0..index.len())
            .map(|p| (index.ids()[p], inner_product(&q, index.reconstruct(p).unwrap())))
            .collect();
        expected.sort_by(|a, b| rank_order(a.1, a.0, b.1, b.0));
        expected.truncate(5);
        assert_eq!(hits, expected);
    }
}
