//! Table-driven embedder for pre-computed vectors.
//!
//! [`PrecomputedEmbedder`] answers from lookup tables filled in advance. It
//! is used when embeddings are produced outside the process (the CLI reads
//! them from JSONL), and by tests that need exact control over scores.
//! Inputs missing from the tables are an `Embedding` error, the same class
//! of failure as an unavailable provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::error::{PixdexError, Result};

/// An embedder that looks vectors up instead of computing them.
///
/// # Example
///
/// ```
/// use pixdex::embedding::{Embedder, PrecomputedEmbedder};
///
/// let embedder = PrecomputedEmbedder::new(2)
///     .with_text("sunset", vec![1.0, 0.0])
///     .with_image(b"img-1".to_vec(), vec![0.9, 0.1]);
///
/// futures::executor::block_on(async {
///     assert_eq!(embedder.embed_text("sunset").await.unwrap(), vec![1.0, 0.0]);
///     assert!(embedder.embed_text("unknown").await.is_err());
/// });
/// ```
#[derive(Debug, Default)]
pub struct PrecomputedEmbedder {
    dimension: usize,
    texts: HashMap<String, Vec<f32>>,
    images: HashMap<Vec<u8>, Vec<f32>>,
    batch_calls: AtomicUsize,
}

impl PrecomputedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    /// Register the vector returned for `text`.
    pub fn with_text<S: Into<String>>(mut self, text: S, vector: Vec<f32>) -> Self {
        self.insert_text(text, vector);
        self
    }

    /// Register the vector returned for `image`.
    pub fn with_image(mut self, image: Vec<u8>, vector: Vec<f32>) -> Self {
        self.insert_image(image, vector);
        self
    }

    pub fn insert_text<S: Into<String>>(&mut self, text: S, vector: Vec<f32>) {
        self.texts.insert(text.into(), vector);
    }

    pub fn insert_image(&mut self, image: Vec<u8>, vector: Vec<f32>) {
        self.images.insert(image, vector);
    }

    /// Number of `embed_images_batch` calls served so far.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::Relaxed)
    }

    fn lookup_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        self.images.get(image).cloned().ok_or_else(|| {
            PixdexError::embedding(format!("no pre-computed vector for {}-byte image", image.len()))
        })
    }
}

#[async_trait]
impl Embedder for PrecomputedEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.texts
            .get(text)
            .cloned()
            .ok_or_else(|| PixdexError::embedding(format!("no pre-computed vector for '{text}'")))
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        self.lookup_image(image)
    }

    async fn embed_images_batch(&self, images: &[&[u8]]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::Relaxed);
        images.iter().map(|image| self.lookup_image(image)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "PrecomputedEmbedder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn embedder() -> PrecomputedEmbedder {
        PrecomputedEmbedder::new(2)
            .with_text("cat", vec![1.0, 0.0])
            .with_image(b"a".to_vec(), vec![0.0, 1.0])
            .with_image(b"b".to_vec(), vec![1.0, 1.0])
    }

    #[tokio::test]
    async fn test_embed_text() {
        let embedder = embedder();
        assert_eq!(embedder.embed_text("cat").await.unwrap(), vec![1.0, 0.0]);
        match embedder.embed_text("dog").await {
            Err(PixdexError::Embedding(message)) => assert!(message.contains("dog")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_embed_images_batch() {
        let embedder = embedder();
        let vectors = embedder
            .embed_images_batch(&[b"b".as_slice(), b"a".as_slice()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![0.0, 1.0]]);
        assert_eq!(embedder.batch_calls(), 1);

        assert!(embedder.embed_images_batch(&[b"zzz".as_slice()]).await.is_err());
        assert_eq!(embedder.batch_calls(), 2);
    }

    #[tokio::test]
    async fn test_arc_embedder() {
        let embedder: Arc<dyn Embedder> = Arc::new(embedder());
        assert_eq!(embedder.dimension(), 2);
        assert_eq!(embedder.name(), "PrecomputedEmbedder");
        assert_eq!(embedder.embed_image(b"a").await.unwrap(), vec![0.0, 1.0]);
    }
}
