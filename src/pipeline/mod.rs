//! Stage handlers and their wiring.
//!
//! The pipeline is a chain of handlers, each subscribed to the previous
//! stage's completion event:
//!
//! ```text
//! SavedToStore        → ExtractionHandler    (progress 10 → 40)
//! TextIngestStarted   → TextChunkingHandler  (text path, skips extraction)
//! PageExtracted       → PageChunkingHandler  (progress 40 → 60)
//! Chunked             → EmbeddingHandler     (progress 60 → 90)
//! EmbeddingsGenerated → VectorStorageHandler (progress 90 → 100)
//! ```
//!
//! Handlers are the boundary of recovery: each catches its own failures,
//! marks the job failed with a stage tag, and publishes `IngestFailed` —
//! nothing propagates back into the bus. Ledger writes along the way are
//! best-effort side channels; the bus alone drives control flow.

pub mod chunking;
pub mod embedding;
pub mod extraction;
pub mod storage;

use std::sync::Arc;

use tracing::warn;

use crate::directory::ProjectDirectory;
use crate::document::{DocumentExtractor, PdfExtractor};
use crate::event_bus::{Correlation, DispatchMode, DomainEvent, EventBus, EventKind, Stage};
use crate::jobs::{JobLedger, JobStatus, LedgerError, StatusUpdate};
use crate::limiter::ConcurrencyLimiter;
use crate::providers::{EmbeddingProvider, LoggingIndexEnsurer, VectorIndexEnsurer};
use crate::storage::{ContentStore, VectorStore};
use crate::workers::CpuPool;

pub use chunking::{PageChunkingHandler, TextChunkingHandler};
pub use embedding::EmbeddingHandler;
pub use extraction::ExtractionHandler;
pub use storage::VectorStorageHandler;

/// Progress floor once extraction begins.
pub(crate) const EXTRACTION_BASE: i64 = 10;
/// Band widths per stage; they sum to 90 on top of the base.
pub(crate) const EXTRACTION_BAND: i64 = 30;
pub(crate) const CHUNKING_BAND: i64 = 20;
pub(crate) const EMBEDDING_BAND: i64 = 30;
pub(crate) const STORAGE_BAND: i64 = 10;

/// Log-and-continue wrapper for best-effort ledger writes.
pub(crate) fn best_effort(job_id: &str, outcome: Result<(), LedgerError>) {
    if let Err(err) = outcome {
        warn!(job_id, %err, "ledger write failed; pipeline continues");
    }
}

/// Shared failure path: mark the job failed with a stage tag and publish
/// `IngestFailed`. The sole recovery action of every stage handler.
pub(crate) async fn fail_job(
    ledger: &JobLedger,
    bus: &EventBus,
    ctx: Correlation,
    stage: Stage,
    message: String,
) {
    best_effort(
        &ctx.job_id,
        ledger
            .update_status(
                &ctx.job_id,
                JobStatus::Failed,
                StatusUpdate::none().with_error(format!("{stage} failed: {message}")),
            )
            .await,
    );
    bus.publish(DomainEvent::failed(ctx, stage, message)).await;
}

/// Wires the stage handlers onto a bus.
///
/// Ledger and stores are mandatory; the embedding provider and project
/// directory must be supplied before [`register`](Self::register). The
/// extractor, limiter, index ensurer, and CPU pool default to the
/// production implementations.
pub struct PipelineBuilder {
    ledger: Arc<JobLedger>,
    content: Arc<ContentStore>,
    vectors: Arc<VectorStore>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    directory: Option<Arc<dyn ProjectDirectory>>,
    extractor: Option<Arc<dyn DocumentExtractor>>,
    limiter: Option<Arc<ConcurrencyLimiter>>,
    ensurer: Option<Arc<dyn VectorIndexEnsurer>>,
    cpu: Option<CpuPool>,
    embed_batch_size: usize,
}

impl PipelineBuilder {
    pub fn new(
        ledger: Arc<JobLedger>,
        content: Arc<ContentStore>,
        vectors: Arc<VectorStore>,
    ) -> Self {
        Self {
            ledger,
            content,
            vectors,
            provider: None,
            directory: None,
            extractor: None,
            limiter: None,
            ensurer: None,
            cpu: None,
            embed_batch_size: 10,
        }
    }

    #[must_use]
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn ProjectDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<ConcurrencyLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn with_index_ensurer(mut self, ensurer: Arc<dyn VectorIndexEnsurer>) -> Self {
        self.ensurer = Some(ensurer);
        self
    }

    #[must_use]
    pub fn with_cpu_pool(mut self, cpu: CpuPool) -> Self {
        self.cpu = Some(cpu);
        self
    }

    #[must_use]
    pub fn with_embed_batch_size(mut self, batch_size: usize) -> Self {
        self.embed_batch_size = batch_size.max(1);
        self
    }

    /// Construct the handlers and subscribe them, once, on `bus`.
    ///
    /// # Panics
    ///
    /// Panics if the embedding provider or project directory was not set.
    pub fn register(self, bus: &Arc<EventBus>) {
        let provider = self
            .provider
            .expect("PipelineBuilder requires an embedding provider");
        let directory = self
            .directory
            .expect("PipelineBuilder requires a project directory");
        let cpu = self.cpu.unwrap_or_default();
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(PdfExtractor::new(cpu.clone())));
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(ConcurrencyLimiter::new()));
        let ensurer = self
            .ensurer
            .unwrap_or_else(|| Arc::new(LoggingIndexEnsurer));

        bus.subscribe(
            EventKind::SavedToStore,
            DispatchMode::Concurrent,
            Arc::new(ExtractionHandler::new(
                Arc::clone(&self.ledger),
                Arc::clone(&self.content),
                extractor,
                limiter,
                Arc::clone(bus),
            )),
        );
        bus.subscribe(
            EventKind::TextIngestStarted,
            DispatchMode::Concurrent,
            Arc::new(TextChunkingHandler::new(
                Arc::clone(&self.ledger),
                Arc::clone(bus),
                cpu.clone(),
            )),
        );
        bus.subscribe(
            EventKind::PageExtracted,
            DispatchMode::Concurrent,
            Arc::new(PageChunkingHandler::new(
                Arc::clone(&self.ledger),
                Arc::clone(bus),
                cpu,
            )),
        );
        bus.subscribe(
            EventKind::Chunked,
            DispatchMode::Concurrent,
            Arc::new(EmbeddingHandler::new(
                Arc::clone(&self.ledger),
                Arc::clone(bus),
                provider,
                self.embed_batch_size,
            )),
        );
        bus.subscribe(
            EventKind::EmbeddingsGenerated,
            DispatchMode::Concurrent,
            Arc::new(VectorStorageHandler::new(
                Arc::clone(&self.ledger),
                Arc::clone(bus),
                Arc::clone(&self.vectors),
                directory,
                ensurer,
            )),
        );
    }
}
