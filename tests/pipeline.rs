mod common;

use std::sync::Arc;

use common::{
    COLLECTION, FailingEmbeddingProvider, FixtureExtractor, PROJECT_DB, PROJECT_ID, ProgressProbe,
    RecordingHandler, USER_ID, build_pipeline, default_pipeline,
};
use inkstream::event_bus::{
    Correlation, DomainEvent, EventKind, SavedToStore, SourceKind, Stage,
};
use inkstream::jobs::{JobStatus, JobType};
use inkstream::limiter::Tier;
use inkstream::providers::MockEmbeddingProvider;
use serde_json::json;

const THREE_PAGES: [&str; 3] = [
    "Page one introduces the topic.\n\nIt has a second paragraph with more detail.",
    "Page two continues the discussion. Another sentence follows here.",
    "Page three concludes the document with final remarks.",
];

fn ctx(job_id: &str) -> Correlation {
    Correlation::new(job_id, USER_ID, PROJECT_ID, COLLECTION)
}

/// Create a queued PDF job and feed the saved-content event that starts the
/// chain. Returns once the entire pipeline for the document has run.
async fn drive_pdf_job(pipeline: &common::TestPipeline, job_id: &str, tier: &str) {
    pipeline
        .ledger
        .create(
            job_id,
            USER_ID,
            PROJECT_ID,
            COLLECTION,
            JobType::PdfIngest,
            json!({
                "filename": "report.pdf",
                "size_bytes": 1234,
                "chunk_size": 500,
                "tier": tier,
                "user_metadata": {"origin": "test"},
            }),
        )
        .await
        .expect("create job");

    let content_hash = pipeline
        .content
        .save_or_reuse(b"%PDF fixture bytes".to_vec(), job_id)
        .await
        .expect("save bytes");

    pipeline
        .bus
        .publish(DomainEvent::SavedToStore(SavedToStore {
            ctx: ctx(job_id),
            content_hash,
            size_bytes: 1234,
            filename: Some("report.pdf".into()),
        }))
        .await;
}

#[tokio::test]
async fn three_page_document_completes_with_matching_counts() {
    let pipeline = default_pipeline(THREE_PAGES.to_vec()).await;
    let recorder = RecordingHandler::new();
    recorder.subscribe_all(&pipeline.bus);
    let probe = ProgressProbe::new(Arc::clone(&pipeline.ledger));
    probe.subscribe_all(&pipeline.bus);

    drive_pdf_job(&pipeline, "job_e2e", "pro").await;

    // Exactly one PageExtracted per page, one completion, no failures.
    assert_eq!(recorder.count_of(EventKind::PageExtracted), 3);
    assert_eq!(recorder.count_of(EventKind::IngestCompleted), 1);
    assert_eq!(recorder.count_of(EventKind::IngestFailed), 0);

    let job = pipeline.ledger.get("job_e2e").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.completed_at.is_some());
    assert_eq!(job.result_u64("pages_processed"), 3);

    let chunks_created = job.result_u64("chunks_created");
    assert!(chunks_created > 0);
    assert_eq!(job.result_u64("embeddings_generated"), chunks_created);
    assert_eq!(job.result_u64("vectors_stored"), chunks_created);

    let stored = pipeline
        .vectors
        .count_for_job(PROJECT_DB, COLLECTION, "job_e2e")
        .await
        .unwrap();
    assert_eq!(stored, chunks_created);

    // Progress never decreases and lands on 100.
    let samples = probe.samples();
    assert!(samples.windows(2).all(|pair| pair[0] <= pair[1]), "{samples:?}");
    assert_eq!(*samples.last().unwrap(), 100);

    // The completion event reports the same aggregates.
    let completed = recorder
        .snapshot()
        .into_iter()
        .find_map(|event| match event {
            DomainEvent::IngestCompleted(event) => Some(event),
            _ => None,
        })
        .unwrap();
    assert_eq!(completed.pages_processed, 3);
    assert_eq!(completed.chunks_created, chunks_created);
}

#[tokio::test]
async fn vector_records_inherit_the_project_expiry() {
    let pipeline = default_pipeline(vec!["A single page of text."]).await;
    drive_pdf_job(&pipeline, "job_exp", "free").await;

    let records = pipeline
        .vectors
        .records_for_job(PROJECT_DB, COLLECTION, "job_exp")
        .await
        .unwrap();
    assert!(!records.is_empty());
    for record in &records {
        assert_eq!(
            record.expires_at.timestamp_millis(),
            pipeline.project_expires_at.timestamp_millis()
        );
        assert_eq!(record.metadata["source_kind"], json!("pdf"));
        assert_eq!(record.metadata["user"]["origin"], json!("test"));
    }
}

#[tokio::test]
async fn pages_flow_in_page_number_order() {
    let pipeline = default_pipeline(THREE_PAGES.to_vec()).await;
    let recorder = RecordingHandler::new();
    recorder.subscribe_all(&pipeline.bus);

    drive_pdf_job(&pipeline, "job_order", "pro").await;

    let pages: Vec<u32> = recorder
        .snapshot()
        .into_iter()
        .filter_map(|event| match event {
            DomainEvent::PageExtracted(event) => Some(event.page_number),
            _ => None,
        })
        .collect();
    assert_eq!(pages, vec![1, 2, 3]);

    let totals: Vec<u32> = recorder
        .snapshot()
        .into_iter()
        .filter_map(|event| match event {
            DomainEvent::PageExtracted(event) => Some(event.total_pages),
            _ => None,
        })
        .collect();
    assert!(totals.iter().all(|&total| total == 3));
}

#[tokio::test]
async fn empty_middle_page_is_skipped_without_failing() {
    let pipeline =
        default_pipeline(vec!["Page one has text.", "   ", "Page three has text."]).await;
    let recorder = RecordingHandler::new();
    recorder.subscribe_all(&pipeline.bus);

    drive_pdf_job(&pipeline, "job_gap", "starter").await;

    // The empty page produced no Chunked event and no error.
    assert_eq!(recorder.count_of(EventKind::PageExtracted), 3);
    assert_eq!(recorder.count_of(EventKind::Chunked), 2);
    assert_eq!(recorder.count_of(EventKind::IngestFailed), 0);

    let job = pipeline.ledger.get("job_gap").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
}

#[tokio::test]
async fn empty_final_page_still_finalizes_the_job() {
    let pipeline = default_pipeline(vec!["Page one has text.", "\n\n"]).await;
    let recorder = RecordingHandler::new();
    recorder.subscribe_all(&pipeline.bus);

    drive_pdf_job(&pipeline, "job_tail", "starter").await;

    let job = pipeline.ledger.get("job_tail").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(recorder.count_of(EventKind::IngestCompleted), 1);
    assert!(job.result_u64("chunks_created") > 0);
}

#[tokio::test]
async fn embedding_failure_fails_the_job_and_stores_nothing() {
    let pipeline = build_pipeline(
        Arc::new(FixtureExtractor::new(THREE_PAGES.to_vec())),
        Arc::new(FailingEmbeddingProvider),
    )
    .await;
    let recorder = RecordingHandler::new();
    recorder.subscribe_all(&pipeline.bus);

    drive_pdf_job(&pipeline, "job_fail", "pro").await;

    // Exactly one failure event, tagged with the embedding stage.
    let failures: Vec<_> = recorder
        .snapshot()
        .into_iter()
        .filter_map(|event| match event {
            DomainEvent::IngestFailed(event) => Some(event),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::Embedding);

    let job = pipeline.ledger.get("job_fail").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("embedding failed"));
    assert!(job.completed_at.is_some());

    let stored = pipeline
        .vectors
        .count_for_job(PROJECT_DB, COLLECTION, "job_fail")
        .await
        .unwrap();
    assert_eq!(stored, 0, "no vector write may follow an embedding failure");
}

#[tokio::test]
async fn exhausted_tier_fails_the_job_as_retriable_extraction_error() {
    let pipeline = default_pipeline(THREE_PAGES.to_vec()).await;
    let recorder = RecordingHandler::new();
    recorder.subscribe_all(&pipeline.bus);

    // Occupy the free tier's single slot for the duration of the attempt.
    let held = pipeline
        .limiter
        .acquire(Tier::Free, "job_blocking")
        .await
        .unwrap();

    drive_pdf_job(&pipeline, "job_limited", "free").await;
    drop(held);

    let job = pipeline.ledger.get("job_limited").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(
        job.error
            .as_deref()
            .unwrap()
            .contains("too many concurrent uploads")
    );

    let failures: Vec<_> = recorder
        .snapshot()
        .into_iter()
        .filter_map(|event| match event {
            DomainEvent::IngestFailed(event) => Some(event),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::Extraction);

    // The held slot was released exactly once; the tier is usable again.
    pipeline
        .limiter
        .acquire(Tier::Free, "job_after")
        .await
        .unwrap();
}

#[tokio::test]
async fn saved_event_without_a_job_is_ignored() {
    let pipeline = default_pipeline(THREE_PAGES.to_vec()).await;
    let recorder = RecordingHandler::new();
    recorder.subscribe_all(&pipeline.bus);

    pipeline
        .bus
        .publish(DomainEvent::SavedToStore(SavedToStore {
            ctx: ctx("job_ghost"),
            content_hash: "0".repeat(64),
            size_bytes: 10,
            filename: None,
        }))
        .await;

    assert_eq!(recorder.count_of(EventKind::PageExtracted), 0);
    assert_eq!(recorder.count_of(EventKind::IngestFailed), 0);
}

#[tokio::test]
async fn source_kind_is_recorded_on_chunk_metadata() {
    let pipeline = default_pipeline(vec!["Some page text."]).await;
    let recorder = RecordingHandler::new();
    recorder.subscribe_all(&pipeline.bus);

    drive_pdf_job(&pipeline, "job_meta", "pro").await;

    let chunked = recorder
        .snapshot()
        .into_iter()
        .find_map(|event| match event {
            DomainEvent::Chunked(event) => Some(event),
            _ => None,
        })
        .unwrap();
    assert_eq!(chunked.chunks.len(), chunked.chunk_metadata.len());
    for (index, meta) in chunked.chunk_metadata.iter().enumerate() {
        assert_eq!(meta.chunk_index, index);
        assert_eq!(meta.source_kind, SourceKind::Pdf);
        assert_eq!(meta.page_number, Some(1));
        assert_eq!(meta.filename.as_deref(), Some("report.pdf"));
    }

    // The mock provider is deterministic, so embeddings align with chunks.
    let provider = MockEmbeddingProvider::new();
    let generated = recorder
        .snapshot()
        .into_iter()
        .find_map(|event| match event {
            DomainEvent::EmbeddingsGenerated(event) => Some(event),
            _ => None,
        })
        .unwrap();
    use inkstream::providers::EmbeddingProvider;
    let expected = provider.embed(&generated.chunks[0]).await.unwrap();
    assert_eq!(generated.embeddings[0], expected);
}
