//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use inkstream::directory::{ProjectDirectory, ProjectScope, StaticDirectory};
use inkstream::document::{DocumentExtractor, ExtractError, PageReader, PageText};
use inkstream::event_bus::{
    DispatchMode, DomainEvent, EventBus, EventHandler, EventKind, HandlerError,
};
use inkstream::jobs::JobLedger;
use inkstream::limiter::ConcurrencyLimiter;
use inkstream::pipeline::PipelineBuilder;
use inkstream::providers::{
    EmbeddingError, EmbeddingProvider, MockEmbeddingProvider,
};
use inkstream::storage::{ContentStore, VectorStore};
use inkstream::workers::CpuPool;

pub const PROJECT_ID: &str = "proj_1";
pub const PROJECT_DB: &str = "proj_1_db";
pub const USER_ID: &str = "user_1";
pub const COLLECTION: &str = "docs";

/// One shared in-memory SQLite pool for all stores of a test.
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite pool")
}

/// Captures every event it sees, in arrival order.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this recorder to every event kind on `bus`.
    pub fn subscribe_all(&self, bus: &EventBus) {
        for kind in [
            EventKind::IngestStarted,
            EventKind::TextIngestStarted,
            EventKind::SavedToStore,
            EventKind::PageExtracted,
            EventKind::Chunked,
            EventKind::EmbeddingsGenerated,
            EventKind::IngestCompleted,
            EventKind::IngestFailed,
        ] {
            bus.subscribe(kind, DispatchMode::Sequential, Arc::new(self.clone()));
        }
    }

    pub fn snapshot(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, kind: EventKind) -> usize {
        self.snapshot()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Samples a job's ledger progress every time any event fires.
///
/// Registered sequentially, so each sample lands before the stage handler
/// for the same event runs.
#[derive(Clone)]
pub struct ProgressProbe {
    ledger: Arc<JobLedger>,
    samples: Arc<Mutex<Vec<i64>>>,
}

impl ProgressProbe {
    pub fn new(ledger: Arc<JobLedger>) -> Self {
        Self {
            ledger,
            samples: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe_all(&self, bus: &EventBus) {
        for kind in [
            EventKind::SavedToStore,
            EventKind::PageExtracted,
            EventKind::Chunked,
            EventKind::EmbeddingsGenerated,
            EventKind::IngestCompleted,
        ] {
            bus.subscribe(kind, DispatchMode::Sequential, Arc::new(self.clone()));
        }
    }

    pub fn samples(&self) -> Vec<i64> {
        self.samples.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for ProgressProbe {
    fn name(&self) -> &'static str {
        "progress_probe"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        if let Ok(Some(job)) = self.ledger.get(event.job_id()).await {
            self.samples.lock().unwrap().push(job.progress);
        }
        Ok(())
    }
}

/// Extractor yielding preset pages regardless of the input bytes.
pub struct FixtureExtractor {
    pages: Vec<String>,
}

impl FixtureExtractor {
    pub fn new<S: Into<String>>(pages: Vec<S>) -> Self {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl DocumentExtractor for FixtureExtractor {
    async fn open(&self, _bytes: Vec<u8>) -> Result<Box<dyn PageReader>, ExtractError> {
        Ok(Box::new(FixtureReader {
            pages: self.pages.clone(),
            cursor: 0,
        }))
    }
}

struct FixtureReader {
    pages: Vec<String>,
    cursor: usize,
}

#[async_trait]
impl PageReader for FixtureReader {
    fn total_pages(&self) -> u32 {
        self.pages.len() as u32
    }

    async fn next_page(&mut self) -> Result<Option<PageText>, ExtractError> {
        let Some(text) = self.pages.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some(PageText {
            page_number: self.cursor as u32,
            total_pages: self.pages.len() as u32,
            text: text.clone(),
        }))
    }
}

/// Provider that always fails, for stage-isolation tests.
pub struct FailingEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::provider("failing", "provider unavailable"))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::provider("failing", "provider unavailable"))
    }

    fn dimensions(&self) -> usize {
        16
    }
}

/// Fully wired pipeline over in-memory stores.
pub struct TestPipeline {
    pub bus: Arc<EventBus>,
    pub ledger: Arc<JobLedger>,
    pub content: Arc<ContentStore>,
    pub vectors: Arc<VectorStore>,
    pub directory: Arc<StaticDirectory>,
    pub limiter: Arc<ConcurrencyLimiter>,
    pub project_expires_at: DateTime<Utc>,
}

/// Wire a pipeline with the given extractor and embedding provider.
pub async fn build_pipeline(
    extractor: Arc<dyn DocumentExtractor>,
    provider: Arc<dyn EmbeddingProvider>,
) -> TestPipeline {
    let pool = memory_pool().await;
    let cpu = CpuPool::new(2);

    let ledger = Arc::new(JobLedger::new(pool.clone()).await.expect("ledger"));
    let content = Arc::new(
        ContentStore::new(pool.clone(), cpu.clone(), std::time::Duration::from_secs(3600))
            .await
            .expect("content store"),
    );
    let vectors = Arc::new(VectorStore::new(pool));

    let project_expires_at = Utc::now() + chrono::Duration::hours(2);
    let directory = Arc::new(StaticDirectory::new());
    directory.insert_project(ProjectScope {
        project_id: PROJECT_ID.to_string(),
        database: PROJECT_DB.to_string(),
        expires_at: project_expires_at,
    });

    let limiter = Arc::new(ConcurrencyLimiter::new());
    let bus = Arc::new(EventBus::new());

    PipelineBuilder::new(Arc::clone(&ledger), Arc::clone(&content), Arc::clone(&vectors))
        .with_extractor(extractor)
        .with_embedding_provider(provider)
        .with_directory(Arc::clone(&directory) as Arc<dyn ProjectDirectory>)
        .with_limiter(Arc::clone(&limiter))
        .with_cpu_pool(cpu)
        .register(&bus);

    TestPipeline {
        bus,
        ledger,
        content,
        vectors,
        directory,
        limiter,
        project_expires_at,
    }
}

/// Default pipeline: fixture pages + deterministic mock embeddings.
pub async fn default_pipeline(pages: Vec<&str>) -> TestPipeline {
    build_pipeline(
        Arc::new(FixtureExtractor::new(pages)),
        Arc::new(MockEmbeddingProvider::new()),
    )
    .await
}
