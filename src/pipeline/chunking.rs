//! Chunking stage: split page text (or a raw text payload) into
//! size-bounded chunks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{CHUNKING_BAND, best_effort, fail_job};
use crate::document::chunk_text;
use crate::event_bus::{
    ChunkMetadata, Chunked, Correlation, DomainEvent, EventBus, EventHandler, HandlerError,
    IngestCompleted, PageExtracted, SourceKind, Stage, TextIngestStarted,
};
use crate::jobs::{IngestionJob, JobLedger, JobStatus, StatusUpdate};
use crate::workers::CpuPool;

const DEFAULT_CHUNK_SIZE: usize = 500;

/// Splits one extracted page into chunks and publishes `Chunked`.
///
/// Empty pages are skipped without an event or an error; when the skipped
/// page is the last one, the job is finalized here so it cannot hang in a
/// non-terminal state.
pub struct PageChunkingHandler {
    ledger: Arc<JobLedger>,
    bus: Arc<EventBus>,
    cpu: CpuPool,
}

impl PageChunkingHandler {
    pub fn new(ledger: Arc<JobLedger>, bus: Arc<EventBus>, cpu: CpuPool) -> Self {
        Self { ledger, bus, cpu }
    }

    async fn run(&self, job: &IngestionJob, event: &PageExtracted) -> Result<(), String> {
        let job_id = &event.ctx.job_id;

        if event.page_text.trim().is_empty() {
            debug!(%job_id, page = event.page_number, "empty page skipped");
            self.finalize_if_last(job, &event.ctx, event.page_number, event.total_pages)
                .await;
            return Ok(());
        }

        let chunk_size = job
            .metadata_u64("chunk_size")
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        let text = event.page_text.clone();
        let chunks = self
            .cpu
            .run(move || chunk_text(&text, chunk_size))
            .await
            .map_err(|err| err.to_string())?;

        if chunks.is_empty() {
            debug!(%job_id, page = event.page_number, "page produced no chunks");
            self.finalize_if_last(job, &event.ctx, event.page_number, event.total_pages)
                .await;
            return Ok(());
        }

        let filename = job.metadata_str("filename").map(str::to_string);
        let user = job
            .metadata
            .get("user_metadata")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let chunk_metadata: Vec<ChunkMetadata> = chunks
            .iter()
            .enumerate()
            .map(|(chunk_index, chunk)| ChunkMetadata {
                chunk_index,
                chunk_chars: chunk.len(),
                source_kind: SourceKind::Pdf,
                page_number: Some(event.page_number),
                total_pages: Some(event.total_pages),
                filename: filename.clone(),
                user: user.clone(),
            })
            .collect();

        info!(
            %job_id,
            page = event.page_number,
            chunks = chunks.len(),
            "page chunked"
        );

        let per_page = if event.total_pages > 0 {
            CHUNKING_BAND / i64::from(event.total_pages)
        } else {
            1
        };
        best_effort(
            job_id,
            self.ledger
                .increment_progress(job_id, per_page, Some(JobStatus::Chunking), None)
                .await,
        );

        self.bus
            .publish(DomainEvent::Chunked(Chunked {
                ctx: event.ctx.clone(),
                chunks,
                chunk_metadata,
            }))
            .await;
        Ok(())
    }

    /// Close out a job whose final page yielded nothing.
    ///
    /// Storage finalizes jobs on the last page's chunks; a skipped last
    /// page would otherwise leave the job open forever.
    async fn finalize_if_last(
        &self,
        job: &IngestionJob,
        ctx: &Correlation,
        page_number: u32,
        total_pages: u32,
    ) {
        if page_number != total_pages || job.status.is_terminal() {
            return;
        }

        let chunks_created = job.result_u64("chunks_created");
        let result = json!({
            "pages_processed": total_pages,
            "total_pages": total_pages,
            "chunks_created": chunks_created,
            "embeddings_generated": job.result_u64("embeddings_generated"),
            "vectors_stored": job.result_u64("vectors_stored"),
        });
        best_effort(
            &ctx.job_id,
            self.ledger
                .update_status(
                    &ctx.job_id,
                    JobStatus::Completed,
                    StatusUpdate::none().with_result(result),
                )
                .await,
        );

        let processing_time_ms =
            (Utc::now() - job.created_at).num_milliseconds().max(0) as u64;
        self.bus
            .publish(DomainEvent::IngestCompleted(IngestCompleted {
                ctx: ctx.clone(),
                pages_processed: total_pages,
                chunks_created,
                processing_time_ms,
            }))
            .await;
    }
}

#[async_trait]
impl EventHandler for PageChunkingHandler {
    fn name(&self) -> &'static str {
        "page_chunking"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let DomainEvent::PageExtracted(event) = event else {
            return Ok(());
        };
        let job_id = &event.ctx.job_id;

        let job = self
            .ledger
            .get(job_id)
            .await
            .map_err(|err| HandlerError::new(self.name(), err.to_string()))?;
        let Some(job) = job else {
            warn!(%job_id, "no job for extracted page; skipping chunking");
            return Ok(());
        };
        if job.status.is_terminal() {
            debug!(%job_id, status = %job.status, "job already terminal; skipping chunking");
            return Ok(());
        }

        if let Err(message) = self.run(&job, event).await {
            fail_job(
                &self.ledger,
                &self.bus,
                event.ctx.clone(),
                Stage::Chunking,
                message,
            )
            .await;
        }
        Ok(())
    }
}

/// Chunks a raw text payload directly from job metadata, skipping
/// extraction entirely.
pub struct TextChunkingHandler {
    ledger: Arc<JobLedger>,
    bus: Arc<EventBus>,
    cpu: CpuPool,
}

impl TextChunkingHandler {
    pub fn new(ledger: Arc<JobLedger>, bus: Arc<EventBus>, cpu: CpuPool) -> Self {
        Self { ledger, bus, cpu }
    }

    async fn run(&self, job: &IngestionJob, event: &TextIngestStarted) -> Result<(), String> {
        let job_id = &event.ctx.job_id;

        let Some(text) = job.metadata_str("text").map(str::to_string) else {
            return Err("no text found in job metadata".to_string());
        };

        best_effort(
            job_id,
            self.ledger
                .update_status(job_id, JobStatus::Chunking, StatusUpdate::progress(30))
                .await,
        );

        let chunk_size = if event.chunk_size > 0 {
            event.chunk_size
        } else {
            DEFAULT_CHUNK_SIZE
        };
        let chunks = self
            .cpu
            .run(move || chunk_text(&text, chunk_size))
            .await
            .map_err(|err| err.to_string())?;

        if chunks.is_empty() {
            return Err("text produced no chunks".to_string());
        }

        let user = job
            .metadata
            .get("user_metadata")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let chunk_metadata: Vec<ChunkMetadata> = chunks
            .iter()
            .enumerate()
            .map(|(chunk_index, chunk)| ChunkMetadata {
                chunk_index,
                chunk_chars: chunk.len(),
                source_kind: SourceKind::Text,
                page_number: None,
                total_pages: None,
                filename: None,
                user: user.clone(),
            })
            .collect();

        info!(%job_id, chunks = chunks.len(), "text chunked");
        best_effort(
            job_id,
            self.ledger
                .update_status(job_id, JobStatus::Chunking, StatusUpdate::progress(50))
                .await,
        );

        self.bus
            .publish(DomainEvent::Chunked(Chunked {
                ctx: event.ctx.clone(),
                chunks,
                chunk_metadata,
            }))
            .await;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for TextChunkingHandler {
    fn name(&self) -> &'static str {
        "text_chunking"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let DomainEvent::TextIngestStarted(event) = event else {
            return Ok(());
        };
        let job_id = &event.ctx.job_id;

        let job = self
            .ledger
            .get(job_id)
            .await
            .map_err(|err| HandlerError::new(self.name(), err.to_string()))?;
        let Some(job) = job else {
            warn!(%job_id, "no job for text ingest; skipping chunking");
            return Ok(());
        };
        if job.status.is_terminal() {
            debug!(%job_id, status = %job.status, "job already terminal; skipping chunking");
            return Ok(());
        }

        if let Err(message) = self.run(&job, event).await {
            fail_job(
                &self.ledger,
                &self.bus,
                event.ctx.clone(),
                Stage::Chunking,
                message,
            )
            .await;
        }
        Ok(())
    }
}
