//! Handler capability for bus subscribers.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use super::event::DomainEvent;

/// A subscriber invoked for every published event of its registered kind.
///
/// Handlers must be self-contained recovery boundaries: a stage handler that
/// fails translates the failure into a ledger write and an `IngestFailed`
/// event itself. An `Err` returned here is logged by the bus and never
/// reaches the publisher or sibling handlers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable name used in dispatch logs.
    fn name(&self) -> &'static str;

    /// Process one event.
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}

/// Error surfaced by a handler to the dispatch layer.
#[derive(Debug, Error, Diagnostic)]
#[error("handler '{handler}' failed: {message}")]
#[diagnostic(
    code(inkstream::event_bus::handler),
    help("Handler errors are isolated; siblings and the publisher continue.")
)]
pub struct HandlerError {
    pub handler: &'static str,
    pub message: String,
}

impl HandlerError {
    pub fn new(handler: &'static str, message: impl Into<String>) -> Self {
        Self {
            handler,
            message: message.into(),
        }
    }
}
