//! Extraction stage: stream pages out of the stored source.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{EXTRACTION_BAND, EXTRACTION_BASE, best_effort, fail_job};
use crate::document::{DocumentExtractor, ExtractError};
use crate::event_bus::{
    DomainEvent, EventBus, EventHandler, HandlerError, PageExtracted, SavedToStore, Stage,
};
use crate::jobs::{JobLedger, JobStatus, StatusUpdate};
use crate::limiter::{ConcurrencyLimiter, Tier};
use crate::storage::{ContentStore, StoreError};

#[derive(Debug, Error, Diagnostic)]
enum ExtractionFailure {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Extract(#[from] ExtractError),
}

/// Streams the saved source page by page, publishing one `PageExtracted`
/// per page.
///
/// Holds a per-tier concurrency slot for the duration of the stream —
/// extraction is the only stage the limiter gates. The slot is an RAII
/// guard, so it is released on success and failure alike.
pub struct ExtractionHandler {
    ledger: Arc<JobLedger>,
    content: Arc<ContentStore>,
    extractor: Arc<dyn DocumentExtractor>,
    limiter: Arc<ConcurrencyLimiter>,
    bus: Arc<EventBus>,
}

impl ExtractionHandler {
    pub fn new(
        ledger: Arc<JobLedger>,
        content: Arc<ContentStore>,
        extractor: Arc<dyn DocumentExtractor>,
        limiter: Arc<ConcurrencyLimiter>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            ledger,
            content,
            extractor,
            limiter,
            bus,
        }
    }

    async fn run(&self, event: &SavedToStore) -> Result<(), ExtractionFailure> {
        let job_id = &event.ctx.job_id;

        best_effort(
            job_id,
            self.ledger
                .update_status(
                    job_id,
                    JobStatus::ExtractingText,
                    StatusUpdate::progress(EXTRACTION_BASE),
                )
                .await,
        );

        let bytes = self.content.get_by_hash(&event.content_hash).await?;
        let mut reader = self.extractor.open(bytes).await?;
        let total_pages = reader.total_pages();
        let per_page = if total_pages > 0 {
            EXTRACTION_BAND / i64::from(total_pages)
        } else {
            1
        };

        info!(%job_id, total_pages, "streaming extraction started");

        let mut streamed = 0u32;
        while let Some(page) = reader.next_page().await? {
            // A downstream stage may have failed the job mid-stream; stop
            // feeding it pages.
            if streamed > 0 && self.job_is_failed(job_id).await {
                debug!(%job_id, "job failed downstream; stopping extraction");
                return Ok(());
            }

            best_effort(
                job_id,
                self.ledger
                    .increment_progress(job_id, per_page, Some(JobStatus::ExtractingText), None)
                    .await,
            );

            debug!(
                %job_id,
                page = page.page_number,
                total_pages,
                chars = page.text.len(),
                "page extracted"
            );
            self.bus
                .publish(DomainEvent::PageExtracted(PageExtracted {
                    ctx: event.ctx.clone(),
                    page_number: page.page_number,
                    total_pages,
                    page_text: page.text,
                }))
                .await;
            streamed += 1;
        }

        info!(%job_id, pages = streamed, "streaming extraction finished");
        Ok(())
    }

    async fn job_is_failed(&self, job_id: &str) -> bool {
        matches!(
            self.ledger.get(job_id).await,
            Ok(Some(job)) if job.status == JobStatus::Failed
        )
    }
}

#[async_trait]
impl EventHandler for ExtractionHandler {
    fn name(&self) -> &'static str {
        "extraction"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let DomainEvent::SavedToStore(event) = event else {
            return Ok(());
        };
        let job_id = &event.ctx.job_id;

        let job = self
            .ledger
            .get(job_id)
            .await
            .map_err(|err| HandlerError::new(self.name(), err.to_string()))?;
        let Some(job) = job else {
            warn!(%job_id, "no job for saved content; skipping extraction");
            return Ok(());
        };
        if job.status.is_terminal() {
            debug!(%job_id, status = %job.status, "job already terminal; skipping extraction");
            return Ok(());
        }

        let tier = Tier::parse(job.metadata_str("tier").unwrap_or_default());
        let slot = match self.limiter.acquire(tier, job_id).await {
            Ok(slot) => slot,
            Err(limit_err) => {
                fail_job(
                    &self.ledger,
                    &self.bus,
                    event.ctx.clone(),
                    Stage::Extraction,
                    limit_err.to_string(),
                )
                .await;
                return Ok(());
            }
        };

        let outcome = self.run(event).await;
        drop(slot);

        if let Err(err) = outcome {
            fail_job(
                &self.ledger,
                &self.bus,
                event.ctx.clone(),
                Stage::Extraction,
                err.to_string(),
            )
            .await;
        }
        Ok(())
    }
}
