//! Core vector math.
//!
//! Every stored and every query vector is L2-normalized, so the raw inner
//! product computed here is the cosine similarity.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::error::{PixdexError, Result};

/// Substituted for a zero norm so normalization never divides by zero.
pub const NORM_EPSILON: f32 = 1e-10;

/// Rows above this count are normalized with rayon.
const PARALLEL_ROW_THRESHOLD: usize = 256;

/// L2 norm (magnitude) of a vector.
pub fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalize in place to unit length.
pub fn normalize(values: &mut [f32]) {
    let norm = l2_norm(values);
    let norm = if norm == 0.0 { NORM_EPSILON } else { norm };
    for value in values.iter_mut() {
        *value /= norm;
    }
}

/// Normalized copy of a vector.
pub fn normalized(values: &[f32]) -> Vec<f32> {
    let mut copy = values.to_vec();
    normalize(&mut copy);
    copy
}

/// Normalize every row of a row-major matrix in one pass.
pub fn normalize_rows(data: &mut [f32], dimension: usize) {
    if dimension == 0 {
        return;
    }
    if data.len() / dimension > PARALLEL_ROW_THRESHOLD {
        data.par_chunks_mut(dimension).for_each(normalize);
    } else {
        data.chunks_mut(dimension).for_each(normalize);
    }
}

/// Inner product of two equal-length vectors.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Fail with `DimensionMismatch` unless `values.len() == expected`.
pub fn validate_dimension(values: &[f32], expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(PixdexError::DimensionMismatch {
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

/// Reject vectors containing NaN or infinite components.
pub fn validate_finite(values: &[f32], external_id: i64) -> Result<()> {
    if values.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(PixdexError::invalid_argument(format!(
            "vector {external_id} contains NaN or infinite values"
        )))
    }
}

/// Result ordering shared by local and federated ranking: higher score
/// first, then lower external id.
pub fn rank_order(a_score: f32, a_id: i64, b_score: f32, b_id: i64) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(&b_id))
}
