//! Embedding provider interface.
//!
//! pixdex does not run models itself. Image and query embeddings come from
//! an external provider behind the [`Embedder`] trait, which is treated as a
//! possibly slow pure function with a fixed output dimension. The only
//! contract callers rely on beyond that is batching through
//! [`Embedder::embed_images_batch`].
//!
//! # Custom Implementation
//!
//! ```
//! use async_trait::async_trait;
//! use pixdex::embedding::Embedder;
//! use pixdex::error::Result;
//!
//! #[derive(Debug)]
//! struct Constant {
//!     dimension: usize,
//! }
//!
//! #[async_trait]
//! impl Embedder for Constant {
//!     async fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
//!         Ok(vec![1.0; self.dimension])
//!     }
//!
//!     async fn embed_image(&self, _image: &[u8]) -> Result<Vec<f32>> {
//!         Ok(vec![1.0; self.dimension])
//!     }
//!
//!     fn dimension(&self) -> usize {
//!         self.dimension
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;

pub mod precomputed;

pub use self::precomputed::PrecomputedEmbedder;

/// Turns images and query text into vectors of one shared space.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Embed a query string.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed one encoded image.
    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>>;

    /// Embed several images at once.
    ///
    /// The default implementation calls `embed_image` sequentially.
    /// Providers with a native batch API should override it.
    async fn embed_images_batch(&self, images: &[&[u8]]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(images.len());
        for image in images {
            vectors.push(self.embed_image(image).await?);
        }
        Ok(vectors)
    }

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Provider name for logs.
    fn name(&self) -> &str {
        "unknown"
    }
}
