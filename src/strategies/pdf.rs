//! PDF ingestion entry point.
//!
//! The caller gets a job id back in well under a second: the strategy
//! creates the job, publishes `IngestStarted`, and hands the bytes to a
//! background task that persists them to the content store and publishes
//! `SavedToStore`. Everything downstream is driven by the bus.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::{IngestError, IngestRequest, IngestStrategy, ValidationError, new_document_id, new_job_id};
use crate::directory::ProjectDirectory;
use crate::event_bus::{
    Correlation, DomainEvent, EventBus, IngestStarted, SavedToStore, SourceKind,
};
use crate::jobs::{JobLedger, JobStatus, JobType, StatusUpdate};
use crate::storage::ContentStore;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A PDF upload: original filename plus raw bytes.
#[derive(Clone, Debug)]
pub struct PdfSource {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Entry point for PDF sources.
pub struct PdfIngestStrategy {
    ledger: Arc<JobLedger>,
    content: Arc<ContentStore>,
    bus: Arc<EventBus>,
    directory: Arc<dyn ProjectDirectory>,
}

impl PdfIngestStrategy {
    pub fn new(
        ledger: Arc<JobLedger>,
        content: Arc<ContentStore>,
        bus: Arc<EventBus>,
        directory: Arc<dyn ProjectDirectory>,
    ) -> Self {
        Self {
            ledger,
            content,
            bus,
            directory,
        }
    }
}

#[async_trait]
impl IngestStrategy for PdfIngestStrategy {
    type Source = PdfSource;

    async fn validate(&self, tier: &str, source: &Self::Source) -> Result<(), ValidationError> {
        let limits = self
            .directory
            .plan_limits(tier)
            .await
            .map_err(|err| ValidationError::Directory {
                message: err.to_string(),
            })?;

        let size_mb = source.bytes.len() as f64 / BYTES_PER_MB;
        if size_mb > limits.pdf_max_size_mb as f64 {
            return Err(ValidationError::PdfTooLarge {
                size_mb,
                limit_mb: limits.pdf_max_size_mb,
            });
        }
        Ok(())
    }

    async fn process(
        &self,
        request: IngestRequest,
        source: Self::Source,
    ) -> Result<String, IngestError> {
        let job_id = new_job_id();
        let document_id = request.document_id.unwrap_or_else(new_document_id);
        let size_bytes = source.bytes.len() as u64;

        self.ledger
            .create(
                &job_id,
                &request.user_id,
                &request.project_id,
                &request.collection,
                JobType::PdfIngest,
                json!({
                    "filename": source.filename.clone(),
                    "size_bytes": size_bytes,
                    "chunk_size": request.chunk_size,
                    "document_id": document_id,
                    "tier": request.tier,
                    "user_metadata": request.metadata.unwrap_or(json!({})),
                }),
            )
            .await?;

        let ctx = Correlation::new(
            job_id.clone(),
            request.user_id.clone(),
            request.project_id.clone(),
            request.collection.clone(),
        );
        self.bus
            .publish(DomainEvent::IngestStarted(IngestStarted {
                ctx: ctx.clone(),
                source_kind: SourceKind::Pdf,
                size_bytes,
                filename: Some(source.filename.clone()),
            }))
            .await;

        // Persist and hand off in the background; the caller only waits for
        // the job to exist.
        let ledger = Arc::clone(&self.ledger);
        let content = Arc::clone(&self.content);
        let bus = Arc::clone(&self.bus);
        let filename = source.filename;
        let bytes = source.bytes;
        tokio::spawn(async move {
            match content.save_or_reuse(bytes, &ctx.job_id).await {
                Ok(content_hash) => {
                    bus.publish(DomainEvent::SavedToStore(SavedToStore {
                        ctx,
                        content_hash,
                        size_bytes,
                        filename: Some(filename),
                    }))
                    .await;
                }
                Err(err) => {
                    warn!(job_id = %ctx.job_id, %err, "saving upload failed");
                    if let Err(ledger_err) = ledger
                        .update_status(
                            &ctx.job_id,
                            JobStatus::Failed,
                            StatusUpdate::none().with_error(err.to_string()),
                        )
                        .await
                    {
                        warn!(job_id = %ctx.job_id, %ledger_err, "failed to record save failure");
                    }
                }
            }
        });

        info!(%job_id, size_bytes, "pdf ingest queued");
        Ok(job_id)
    }
}
