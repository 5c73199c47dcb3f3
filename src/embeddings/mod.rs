//! Embedding generation behind a pluggable contract
//!
//! The embedding model is an external collaborator: text in, fixed-width
//! float vector out. The same model must be used for index construction and
//! querying; the default implementation runs local ONNX models via fastembed.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use thiserror::Error;

/// An embedding vector
pub type Embedding = Vec<f32>;

/// Errors from embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Model loading or inference failure
    #[error("embedding model error: {0}")]
    Model(String),

    /// The model returned no output for an input
    #[error("embedding produced no output")]
    Empty,
}

/// Contract for embedding backends
///
/// Batch embedding must preserve input order, and `dimensions` is fixed for
/// the lifetime of the implementation.
pub trait Embedder: Send + Sync {
    /// Output vector width
    fn dimensions(&self) -> usize;

    /// Generate an embedding for a single text
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Generate embeddings for multiple texts, preserving input order
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Embedding>, EmbeddingError>;
}

/// Embedder backed by fastembed's all-MiniLM-L6-v2 (384 dimensions, ~80MB)
pub struct FastembedEmbedder {
    model: TextEmbedding,
    dimensions: usize,
}

impl FastembedEmbedder {
    /// Load the default model, downloading it on first use
    pub fn new() -> Result<Self, EmbeddingError> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true),
        )
        .map_err(|e| EmbeddingError::Model(e.to_string()))?;

        Ok(Self {
            model,
            dimensions: 384,
        })
    }
}

impl Embedder for FastembedEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let embeddings = self
            .model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::Model(e.to_string()))?;
        embeddings.into_iter().next().ok_or(EmbeddingError::Empty)
    }

    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Embedding>, EmbeddingError> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.model
            .embed(refs, None)
            .map_err(|e| EmbeddingError::Model(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires model download, run with --ignored
    fn test_fastembed_dimensions() {
        let embedder = FastembedEmbedder::new().unwrap();
        assert_eq!(embedder.dimensions(), 384);

        let embedding = embedder.embed("db.host: localhost").unwrap();
        assert_eq!(embedding.len(), 384);
        assert!(embedding.iter().any(|&x| x != 0.0));
    }

    #[test]
    #[ignore] // Requires model download
    fn test_fastembed_batch_preserves_order() {
        let embedder = FastembedEmbedder::new().unwrap();
        let texts = vec![
            "db.host: localhost".to_string(),
            "completely unrelated sentence about birds".to_string(),
        ];

        let batch = embedder.embed_batch(texts.clone()).unwrap();
        assert_eq!(batch.len(), 2);

        let single = embedder.embed(&texts[0]).unwrap();
        assert_eq!(batch[0], single);
    }
}
