//! # Inkstream: event-driven document ingestion
//!
//! Inkstream is the ingestion core of a multi-tenant, ephemeral document
//! platform. Raw content (PDF bytes or plain text) is converted into vector
//! embeddings through a chain of independently-failing stages coordinated by
//! a typed publish/subscribe event bus:
//!
//! ```text
//! IngestStrategy ──► ContentStore ──► SavedToStore
//!                                          │
//!                     ExtractionHandler ◄──┘   (per-tier concurrency slot)
//!                          │ one PageExtracted per page
//!                     ChunkingHandler
//!                          │ Chunked
//!                     EmbeddingHandler        (batched provider calls)
//!                          │ EmbeddingsGenerated
//!                     VectorStorageHandler ──► IngestCompleted
//! ```
//!
//! Every stage records its progress in the [`jobs::JobLedger`] and translates
//! its own failures into an `IngestFailed` event — errors never escape a
//! handler into the bus. Clients observe the ledger, never the bus.
//!
//! ## Core pieces
//!
//! - [`event_bus`] — typed registry dispatcher with sequential/concurrent
//!   handler modes and per-handler error isolation
//! - [`jobs`] — durable job ledger with atomic progress counters
//! - [`limiter`] — per-tier bounded extraction slots with RAII release
//! - [`storage`] — content-addressed TTL blob store and the tenant-scoped
//!   vector store
//! - [`pipeline`] — the stage handlers and their wiring
//! - [`strategies`] — validated entry points for PDF and text sources
//! - [`directory`], [`providers`] — boundary traits for the project/plan
//!   directory, embedding provider, and vector index ensurer
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use inkstream::event_bus::EventBus;
//! use inkstream::pipeline::PipelineBuilder;
//!
//! let bus = Arc::new(EventBus::new());
//! PipelineBuilder::new(ledger, content_store, vector_store)
//!     .with_extractor(extractor)
//!     .with_embedding_provider(provider)
//!     .with_directory(directory)
//!     .register(&bus);
//! ```

pub mod config;
pub mod directory;
pub mod document;
pub mod event_bus;
pub mod jobs;
pub mod limiter;
pub mod pipeline;
pub mod providers;
pub mod storage;
pub mod strategies;
pub mod telemetry;
pub mod workers;
