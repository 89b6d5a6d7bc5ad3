//! Durable byte and vector storage.
//!
//! Two stores live here:
//!
//! - [`ContentStore`] — content-addressed, TTL-expiring storage for raw
//!   uploaded bytes, with reference counting for deduplication statistics.
//! - [`VectorStore`] — tenant-scoped vector tables, one per project
//!   database + collection, whose records expire together with their
//!   project.
//!
//! Both uphold the same logical contract: callers never observe a record
//! past its expiry, whether or not a background reaper has physically
//! removed it yet.

pub mod content_store;
pub mod vector_store;

use miette::Diagnostic;
use thiserror::Error;

use crate::workers::WorkerError;

pub use content_store::{BlobStats, ContentStore, StoredBlob};
pub use vector_store::{VectorRecord, VectorStore};

/// Errors surfaced by the byte and vector stores.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// The referenced blob is absent or expired.
    #[error("content not found for hash {hash} (it may have expired)")]
    #[diagnostic(
        code(inkstream::storage::not_found),
        help("Stored content expires on a fixed horizon; re-upload if needed.")
    )]
    NotFound { hash: String },

    /// A database or collection name failed identifier validation.
    #[error("invalid store identifier '{name}'")]
    #[diagnostic(
        code(inkstream::storage::invalid_identifier),
        help("Identifiers may contain ASCII letters, digits, and underscores only.")
    )]
    InvalidIdentifier { name: String },

    #[error("storage database error: {0}")]
    #[diagnostic(code(inkstream::storage::sqlx))]
    Sqlx(#[from] sqlx::Error),

    #[error("storage serialization error: {0}")]
    #[diagnostic(code(inkstream::storage::serde))]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Worker(#[from] WorkerError),
}

/// Validate a name for direct use in a SQL identifier position.
pub(crate) fn validate_identifier(name: &str) -> Result<&str, StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation_rejects_injection() {
        assert!(validate_identifier("docs_v2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("docs; DROP TABLE jobs").is_err());
        assert!(validate_identifier("docs-prod").is_err());
    }
}
