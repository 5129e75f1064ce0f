//! Vectors and the exact inner-product index.
//!
//! # Module Structure
//!
//! - `core`: normalization, inner product, ranking order
//! - `flat`: [`FlatIndex`], the in-memory form of one scope's index
//! - `io`: the on-disk artifact codec

pub mod core;
pub mod flat;
pub mod io;

pub use self::core::{NORM_EPSILON, inner_product, l2_norm, normalize, normalized};
pub use self::flat::FlatIndex;
