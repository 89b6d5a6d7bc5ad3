//! Vector-storage stage: persist embeddings and finalize the job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{STORAGE_BAND, best_effort, fail_job};
use crate::directory::ProjectDirectory;
use crate::event_bus::{
    DomainEvent, EmbeddingsGenerated, EventBus, EventHandler, HandlerError, IngestCompleted, Stage,
};
use crate::jobs::{IngestionJob, JobLedger, JobStatus, StatusUpdate};
use crate::providers::VectorIndexEnsurer;
use crate::storage::{VectorRecord, VectorStore};

/// Writes one vector record per chunk into the tenant's collection table.
///
/// Records inherit the owning project's expiry, so vectors and their
/// project vanish together. Aggregate counters accumulate in the job's
/// result map; the event for the final page flips the job to `completed`
/// and publishes `IngestCompleted`.
pub struct VectorStorageHandler {
    ledger: Arc<JobLedger>,
    bus: Arc<EventBus>,
    vectors: Arc<VectorStore>,
    directory: Arc<dyn ProjectDirectory>,
    ensurer: Arc<dyn VectorIndexEnsurer>,
}

impl VectorStorageHandler {
    pub fn new(
        ledger: Arc<JobLedger>,
        bus: Arc<EventBus>,
        vectors: Arc<VectorStore>,
        directory: Arc<dyn ProjectDirectory>,
        ensurer: Arc<dyn VectorIndexEnsurer>,
    ) -> Self {
        Self {
            ledger,
            bus,
            vectors,
            directory,
            ensurer,
        }
    }

    async fn run(&self, job: &IngestionJob, event: &EmbeddingsGenerated) -> Result<(), String> {
        let job_id = &event.ctx.job_id;

        best_effort(
            job_id,
            self.ledger
                .increment_progress(job_id, 0, Some(JobStatus::Storing), None)
                .await,
        );

        let scope = self
            .directory
            .project_scope(&event.ctx.project_id)
            .await
            .map_err(|err| err.to_string())?;

        let now = Utc::now();
        let records: Vec<VectorRecord> = event
            .chunks
            .iter()
            .zip(event.embeddings.iter())
            .zip(event.metadata.iter())
            .map(|((chunk, embedding), meta)| {
                Ok(VectorRecord {
                    id: Uuid::new_v4().to_string(),
                    job_id: job_id.clone(),
                    text: chunk.clone(),
                    embedding: embedding.clone(),
                    metadata: serde_json::to_value(meta).map_err(|err| err.to_string())?,
                    created_at: now,
                    expires_at: scope.expires_at,
                })
            })
            .collect::<Result<_, String>>()?;
        if records.is_empty() {
            return Err(format!(
                "no records to insert (chunks={}, embeddings={})",
                event.chunks.len(),
                event.embeddings.len()
            ));
        }

        let inserted = self
            .vectors
            .insert_records(&scope.database, &event.ctx.collection, &records)
            .await
            .map_err(|err| err.to_string())?;

        // A missing similarity index degrades search, not ingestion.
        let dimensions = event.embeddings.first().map_or(0, Vec::len);
        if let Err(err) = self
            .ensurer
            .ensure(&scope.database, &event.ctx.collection, dimensions)
            .await
        {
            warn!(%job_id, %err, "vector index could not be ensured; continuing");
        }

        debug!(%job_id, inserted, "vectors stored");

        // Cumulative counters come from the vector table itself, which is
        // authoritative across the per-page events of one job. Chunks,
        // embeddings, and records map one-to-one.
        let stored_total = self
            .vectors
            .count_for_job(&scope.database, &event.ctx.collection, job_id)
            .await
            .map_err(|err| err.to_string())?;

        let page_number = event.metadata.first().and_then(|meta| meta.page_number);
        let total_pages = event.metadata.first().and_then(|meta| meta.total_pages);
        let pages_processed = page_number.unwrap_or(1);
        let chunks_created = stored_total;
        let embeddings_generated = stored_total;
        let vectors_stored = stored_total;
        let result = json!({
            "pages_processed": pages_processed,
            "total_pages": total_pages.unwrap_or(1),
            "chunks_created": chunks_created,
            "embeddings_generated": embeddings_generated,
            "vectors_stored": vectors_stored,
        });

        let is_final = match (page_number, total_pages) {
            (Some(page), Some(total)) => page == total,
            _ => true,
        };
        if is_final {
            best_effort(
                job_id,
                self.ledger
                    .update_status(
                        job_id,
                        JobStatus::Completed,
                        StatusUpdate::none().with_result(result),
                    )
                    .await,
            );

            let processing_time_ms =
                (Utc::now() - job.created_at).num_milliseconds().max(0) as u64;
            info!(
                %job_id,
                chunks_created, vectors_stored, processing_time_ms, "ingest completed"
            );
            self.bus
                .publish(DomainEvent::IngestCompleted(IngestCompleted {
                    ctx: event.ctx.clone(),
                    pages_processed,
                    chunks_created,
                    processing_time_ms,
                }))
                .await;
        } else {
            let total = i64::from(total_pages.unwrap_or(1).max(1));
            best_effort(
                job_id,
                self.ledger
                    .increment_progress(
                        job_id,
                        STORAGE_BAND / total,
                        Some(JobStatus::Storing),
                        Some(result),
                    )
                    .await,
            );
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for VectorStorageHandler {
    fn name(&self) -> &'static str {
        "vector_storage"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let DomainEvent::EmbeddingsGenerated(event) = event else {
            return Ok(());
        };
        let job_id = &event.ctx.job_id;

        let job = self
            .ledger
            .get(job_id)
            .await
            .map_err(|err| HandlerError::new(self.name(), err.to_string()))?;
        let Some(job) = job else {
            warn!(%job_id, "no job for embeddings; skipping storage");
            return Ok(());
        };
        if job.status.is_terminal() {
            debug!(%job_id, status = %job.status, "job already terminal; skipping storage");
            return Ok(());
        }

        if let Err(message) = self.run(&job, event).await {
            fail_job(
                &self.ledger,
                &self.bus,
                event.ctx.clone(),
                Stage::Storage,
                message,
            )
            .await;
        }
        Ok(())
    }
}
