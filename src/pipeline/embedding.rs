//! Embedding stage: batch chunks through the embedding provider.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{EMBEDDING_BAND, best_effort, fail_job};
use crate::event_bus::{
    Chunked, DomainEvent, EmbeddingsGenerated, EventBus, EventHandler, HandlerError, Stage,
};
use crate::jobs::{JobLedger, JobStatus};
use crate::providers::EmbeddingProvider;

/// Generates embedding vectors in fixed-size batches.
///
/// Batching bounds peak memory and amortizes provider round-trips; progress
/// is published cumulatively per batch inside the 60→90 band.
pub struct EmbeddingHandler {
    ledger: Arc<JobLedger>,
    bus: Arc<EventBus>,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingHandler {
    pub fn new(
        ledger: Arc<JobLedger>,
        bus: Arc<EventBus>,
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Self {
        Self {
            ledger,
            bus,
            provider,
            batch_size: batch_size.max(1),
        }
    }

    async fn run(&self, event: &Chunked) -> Result<(), String> {
        let job_id = &event.ctx.job_id;

        best_effort(
            job_id,
            self.ledger
                .increment_progress(job_id, 0, Some(JobStatus::GeneratingEmbeddings), None)
                .await,
        );

        // Share of the 60→90 band owned by this event's page (one page per
        // event on the PDF path, the whole payload on the text path).
        let total_pages = event
            .chunk_metadata
            .first()
            .and_then(|meta| meta.total_pages)
            .unwrap_or(1)
            .max(1);
        let band_share = EMBEDDING_BAND / i64::from(total_pages);
        let batch_count = event.chunks.len().div_ceil(self.batch_size).max(1);
        let per_batch = band_share / batch_count as i64;

        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(event.chunks.len());
        for (index, batch) in event.chunks.chunks(self.batch_size).enumerate() {
            let batch_vectors = self
                .provider
                .embed_batch(batch)
                .await
                .map_err(|err| err.to_string())?;
            embeddings.extend(batch_vectors);

            // The final batch takes whatever integer remainder is left of
            // this page's share.
            let delta = if index + 1 == batch_count {
                band_share - per_batch * (batch_count as i64 - 1)
            } else {
                per_batch
            };
            best_effort(
                job_id,
                self.ledger
                    .increment_progress(job_id, delta, Some(JobStatus::GeneratingEmbeddings), None)
                    .await,
            );
            debug!(
                %job_id,
                embedded = embeddings.len(),
                total = event.chunks.len(),
                "embedding batch complete"
            );
        }

        info!(%job_id, count = embeddings.len(), "embeddings generated");
        self.bus
            .publish(DomainEvent::EmbeddingsGenerated(EmbeddingsGenerated {
                ctx: event.ctx.clone(),
                embeddings,
                chunks: event.chunks.clone(),
                metadata: event.chunk_metadata.clone(),
            }))
            .await;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for EmbeddingHandler {
    fn name(&self) -> &'static str {
        "embedding"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let DomainEvent::Chunked(event) = event else {
            return Ok(());
        };
        let job_id = &event.ctx.job_id;

        let job = self
            .ledger
            .get(job_id)
            .await
            .map_err(|err| HandlerError::new(self.name(), err.to_string()))?;
        let Some(job) = job else {
            warn!(%job_id, "no job for chunked event; skipping embedding");
            return Ok(());
        };
        if job.status.is_terminal() {
            debug!(%job_id, status = %job.status, "job already terminal; skipping embedding");
            return Ok(());
        }

        if let Err(message) = self.run(event).await {
            fail_job(
                &self.ledger,
                &self.bus,
                event.ctx.clone(),
                Stage::Embedding,
                message,
            )
            .await;
        }
        Ok(())
    }
}
