//! External provider boundaries: embeddings and vector-index management.

pub mod embeddings;
pub mod index;

pub use embeddings::{EmbeddingError, EmbeddingProvider, MockEmbeddingProvider};
pub use index::{LoggingIndexEnsurer, VectorIndexEnsurer};
