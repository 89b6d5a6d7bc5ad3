//! Plain-text ingestion entry point.
//!
//! Text payloads skip the content store and extraction: the raw text is
//! kept in job metadata, and the published event hands control directly to
//! the chunking stage. Because `publish` awaits its handlers, small text
//! payloads complete their whole pipeline before `process` returns.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{IngestError, IngestRequest, IngestStrategy, ValidationError, new_document_id, new_job_id};
use crate::event_bus::{Correlation, DomainEvent, EventBus, TextIngestStarted};
use crate::jobs::{JobLedger, JobType};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const MAX_TEXT_SIZE_MB: u64 = 10;

/// Entry point for raw text sources.
pub struct TextIngestStrategy {
    ledger: Arc<JobLedger>,
    bus: Arc<EventBus>,
}

impl TextIngestStrategy {
    pub fn new(ledger: Arc<JobLedger>, bus: Arc<EventBus>) -> Self {
        Self { ledger, bus }
    }
}

#[async_trait]
impl IngestStrategy for TextIngestStrategy {
    type Source = String;

    async fn validate(&self, _tier: &str, source: &Self::Source) -> Result<(), ValidationError> {
        let size_mb = source.len() as f64 / BYTES_PER_MB;
        if size_mb > MAX_TEXT_SIZE_MB as f64 {
            return Err(ValidationError::TextTooLarge {
                size_mb,
                limit_mb: MAX_TEXT_SIZE_MB,
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
        let size_bytes = source.len() as u64;

        self.ledger
            .create(
                &job_id,
                &request.user_id,
                &request.project_id,
                &request.collection,
                JobType::TextIngest,
                json!({
                    "text": source,
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
            .publish(DomainEvent::TextIngestStarted(TextIngestStarted {
                ctx,
                chunk_size: request.chunk_size,
            }))
            .await;

        info!(%job_id, size_bytes, "text ingest processed");
        Ok(job_id)
    }
}
