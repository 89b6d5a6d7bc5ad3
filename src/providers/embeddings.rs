//! Embedding provider capability.
//!
//! The pipeline consumes an opaque embedding service; concrete backends
//! (hosted APIs, local models) live outside this crate. The deterministic
//! [`MockEmbeddingProvider`] ships here so tests and demos run without any
//! network dependency.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by embedding providers.
#[derive(Debug, Error, Diagnostic)]
pub enum EmbeddingError {
    #[error("embedding provider error ({provider}): {message}")]
    #[diagnostic(code(inkstream::providers::embedding))]
    Provider {
        provider: &'static str,
        message: String,
    },
}

impl EmbeddingError {
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }
}

/// Turns text into fixed-dimension embedding vectors.
///
/// `embed_batch` must return one vector per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;
}

/// Deterministic, dependency-free provider for tests and demos.
///
/// Vectors are derived from character statistics of the input, so equal
/// inputs always produce equal vectors.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: 16 }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for (index, byte) in text.bytes().enumerate() {
            vector[index % self.dimensions] += f32::from(byte) / 255.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
