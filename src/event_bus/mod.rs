//! Typed publish/subscribe dispatcher and the domain-event vocabulary.
//!
//! The bus is the connective tissue between pipeline stages: each stage
//! subscribes to the previous stage's completion event and publishes the
//! next one. Registration is explicit and happens once at wiring time —
//! there is no ambient global bus; every component receives its bus by
//! constructor injection so tests can substitute their own.

pub mod bus;
pub mod event;
pub mod handler;

pub use bus::{DispatchMode, EventBus};
pub use event::{
    Chunked, ChunkMetadata, Correlation, DomainEvent, EmbeddingsGenerated, EventKind,
    IngestCompleted, IngestFailed, IngestStarted, PageExtracted, SavedToStore, SourceKind, Stage,
    TextIngestStarted,
};
pub use handler::{EventHandler, HandlerError};
