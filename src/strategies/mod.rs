//! Ingestion entry points.
//!
//! A strategy validates an incoming source against the tenant's tier limits
//! and, only then, creates the job and kicks off the pipeline. Validation
//! failures never touch the ledger — no job id is ever returned for an
//! over-limit source.

pub mod pdf;
pub mod text;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use uuid::Uuid;

use crate::jobs::LedgerError;

pub use pdf::{PdfIngestStrategy, PdfSource};
pub use text::TextIngestStrategy;

/// Source violates a tier limit; raised before any job exists.
#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("PDF too large: {size_mb:.2}MB exceeds the tier limit of {limit_mb}MB")]
    #[diagnostic(
        code(inkstream::strategies::pdf_too_large),
        help("Split the document or upgrade the tier.")
    )]
    PdfTooLarge { size_mb: f64, limit_mb: u64 },

    #[error(
        "text too large: {size_mb:.2}MB exceeds the limit of {limit_mb}MB; \
         consider uploading a PDF for large documents"
    )]
    #[diagnostic(code(inkstream::strategies::text_too_large))]
    TextTooLarge { size_mb: f64, limit_mb: u64 },

    #[error("tier limits unavailable: {message}")]
    #[diagnostic(code(inkstream::strategies::directory))]
    Directory { message: String },
}

/// Errors surfaced by `process`.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ledger(#[from] LedgerError),
}

/// Caller-provided scope and options for one ingestion.
#[derive(Clone, Debug)]
pub struct IngestRequest {
    pub user_id: String,
    pub project_id: String,
    pub collection: String,
    /// Tier name as known to the plan catalog.
    pub tier: String,
    /// Existing document id for progressive ingestion; generated if absent.
    pub document_id: Option<String>,
    /// Arbitrary metadata copied onto every produced chunk.
    pub metadata: Option<serde_json::Value>,
    /// Target chunk size in tokens.
    pub chunk_size: usize,
}

impl IngestRequest {
    pub fn new(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        collection: impl Into<String>,
        tier: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
            collection: collection.into(),
            tier: tier.into(),
            document_id: None,
            metadata: None,
            chunk_size: 500,
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Validated entry point for one source type.
#[async_trait]
pub trait IngestStrategy: Send + Sync {
    type Source: Send + Sync;

    /// Check the source against the tier's limits. Must be called before
    /// `process`; raises without creating any job.
    async fn validate(&self, tier: &str, source: &Self::Source) -> Result<(), ValidationError>;

    /// Create the job and kick off the pipeline, returning the job id.
    async fn process(
        &self,
        request: IngestRequest,
        source: Self::Source,
    ) -> Result<String, IngestError>;
}

pub(crate) fn new_job_id() -> String {
    format!("job_{}", short_hex())
}

pub(crate) fn new_document_id() -> String {
    format!("doc_{}", short_hex())
}

fn short_hex() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_their_prefix() {
        let job_id = new_job_id();
        let doc_id = new_document_id();
        assert!(job_id.starts_with("job_") && job_id.len() == 16);
        assert!(doc_id.starts_with("doc_") && doc_id.len() == 16);
        assert_ne!(new_job_id(), job_id);
    }
}
