//! Vector-similarity index management boundary.

use async_trait::async_trait;
use tracing::debug;

/// Ensures a similarity index exists for a collection.
///
/// Implementations must be idempotent: an already-existing index is not an
/// error. Unexpected failures are the caller's to log — ingestion proceeds
/// regardless, since a missing search index degrades queries, not writes.
#[async_trait]
pub trait VectorIndexEnsurer: Send + Sync {
    /// Create the similarity index for `collection` if absent.
    async fn ensure(&self, database: &str, collection: &str, dimensions: usize)
    -> Result<(), String>;
}

/// Default ensurer for backends without a native similarity index: records
/// the request and succeeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingIndexEnsurer;

#[async_trait]
impl VectorIndexEnsurer for LoggingIndexEnsurer {
    async fn ensure(
        &self,
        database: &str,
        collection: &str,
        dimensions: usize,
    ) -> Result<(), String> {
        debug!(database, collection, dimensions, "vector index ensured");
        Ok(())
    }
}
