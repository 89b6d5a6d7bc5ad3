//! Immutable domain events emitted by the ingestion pipeline.
//!
//! Every variant carries a [`Correlation`] — job id, owner, project scope,
//! and target collection — so any consumer can attribute an event to its
//! job without extra lookups.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Correlation data shared by every pipeline event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub job_id: String,
    pub user_id: String,
    pub project_id: String,
    pub collection: String,
}

impl Correlation {
    pub fn new(
        job_id: impl Into<String>,
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            user_id: user_id.into(),
            project_id: project_id.into(),
            collection: collection.into(),
        }
    }
}

/// The kind of source a job ingests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Pdf,
    Text,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Pipeline stage tag carried by failure events and job errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Chunking,
    Embedding,
    Storage,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extraction => write!(f, "extraction"),
            Self::Chunking => write!(f, "chunking"),
            Self::Embedding => write!(f, "embedding"),
            Self::Storage => write!(f, "storage"),
        }
    }
}

/// Per-chunk metadata attached between the chunking and storage stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_index: usize,
    pub chunk_chars: usize,
    pub source_kind: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Arbitrary caller-supplied metadata, copied onto every chunk.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub user: serde_json::Value,
}

/// Published by the PDF entry point once a job exists, before the bytes are
/// persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestStarted {
    pub ctx: Correlation,
    pub source_kind: SourceKind,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Published by the text entry point; the chunking stage consumes this
/// directly, skipping extraction. The raw text lives in job metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextIngestStarted {
    pub ctx: Correlation,
    pub chunk_size: usize,
}

/// The uploaded bytes are durably in the content store and ready to process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedToStore {
    pub ctx: Correlation,
    pub content_hash: String,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// One page of decoded text. Emitted once per page, in page order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageExtracted {
    pub ctx: Correlation,
    pub page_number: u32,
    pub total_pages: u32,
    pub page_text: String,
}

/// A page (or a full text payload) split into chunks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunked {
    pub ctx: Correlation,
    pub chunks: Vec<String>,
    pub chunk_metadata: Vec<ChunkMetadata>,
}

/// Embedding vectors for a batch of chunks, order-aligned with `chunks`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsGenerated {
    pub ctx: Correlation,
    pub embeddings: Vec<Vec<f32>>,
    pub chunks: Vec<String>,
    pub metadata: Vec<ChunkMetadata>,
}

/// Terminal success event with aggregate counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestCompleted {
    pub ctx: Correlation,
    pub pages_processed: u32,
    pub chunks_created: u64,
    pub processing_time_ms: u64,
}

/// Terminal failure event; the sole recovery action of a stage handler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestFailed {
    pub ctx: Correlation,
    pub stage: Stage,
    pub error_message: String,
}

/// All events flowing through the ingestion pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    IngestStarted(IngestStarted),
    TextIngestStarted(TextIngestStarted),
    SavedToStore(SavedToStore),
    PageExtracted(PageExtracted),
    Chunked(Chunked),
    EmbeddingsGenerated(EmbeddingsGenerated),
    IngestCompleted(IngestCompleted),
    IngestFailed(IngestFailed),
}

/// Discriminant used as the registry key for handler subscriptions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    IngestStarted,
    TextIngestStarted,
    SavedToStore,
    PageExtracted,
    Chunked,
    EmbeddingsGenerated,
    IngestCompleted,
    IngestFailed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IngestStarted => "ingest_started",
            Self::TextIngestStarted => "text_ingest_started",
            Self::SavedToStore => "saved_to_store",
            Self::PageExtracted => "page_extracted",
            Self::Chunked => "chunked",
            Self::EmbeddingsGenerated => "embeddings_generated",
            Self::IngestCompleted => "ingest_completed",
            Self::IngestFailed => "ingest_failed",
        };
        write!(f, "{name}")
    }
}

impl DomainEvent {
    /// Concrete variant tag, used for handler dispatch.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::IngestStarted(_) => EventKind::IngestStarted,
            Self::TextIngestStarted(_) => EventKind::TextIngestStarted,
            Self::SavedToStore(_) => EventKind::SavedToStore,
            Self::PageExtracted(_) => EventKind::PageExtracted,
            Self::Chunked(_) => EventKind::Chunked,
            Self::EmbeddingsGenerated(_) => EventKind::EmbeddingsGenerated,
            Self::IngestCompleted(_) => EventKind::IngestCompleted,
            Self::IngestFailed(_) => EventKind::IngestFailed,
        }
    }

    /// Correlation data carried by every variant.
    pub fn correlation(&self) -> &Correlation {
        match self {
            Self::IngestStarted(e) => &e.ctx,
            Self::TextIngestStarted(e) => &e.ctx,
            Self::SavedToStore(e) => &e.ctx,
            Self::PageExtracted(e) => &e.ctx,
            Self::Chunked(e) => &e.ctx,
            Self::EmbeddingsGenerated(e) => &e.ctx,
            Self::IngestCompleted(e) => &e.ctx,
            Self::IngestFailed(e) => &e.ctx,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.correlation().job_id
    }

    /// Convenience constructor for the failure event.
    pub fn failed(ctx: Correlation, stage: Stage, error_message: impl Into<String>) -> Self {
        Self::IngestFailed(IngestFailed {
            ctx,
            stage,
            error_message: error_message.into(),
        })
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageExtracted(e) => write!(
                f,
                "[{}] page_extracted {}/{}",
                e.ctx.job_id, e.page_number, e.total_pages
            ),
            Self::Chunked(e) => {
                write!(f, "[{}] chunked ({} chunks)", e.ctx.job_id, e.chunks.len())
            }
            Self::EmbeddingsGenerated(e) => write!(
                f,
                "[{}] embeddings_generated ({} vectors)",
                e.ctx.job_id,
                e.embeddings.len()
            ),
            Self::IngestFailed(e) => write!(
                f,
                "[{}] ingest_failed at {}: {}",
                e.ctx.job_id, e.stage, e.error_message
            ),
            other => write!(f, "[{}] {}", other.job_id(), other.kind()),
        }
    }
}
