//! Registry-based event dispatcher.

use std::sync::{Arc, RwLock};

use futures_util::future::join_all;
use rustc_hash::FxHashMap;
use tracing::error;

use super::event::{DomainEvent, EventKind};
use super::handler::EventHandler;

/// How a handler participates in dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    /// Run before any concurrent handler, in registration order.
    Sequential,
    /// Fan out together with the other concurrent handlers.
    Concurrent,
}

type HandlerList = Vec<Arc<dyn EventHandler>>;

/// Typed publish/subscribe dispatcher.
///
/// Handlers are registered once at process start against a concrete
/// [`EventKind`]; `publish` looks up the event's kind and invokes every
/// registered handler. Sequential handlers run first, one at a time, in
/// registration order; concurrent handlers then run as a joined fan-out.
/// A failing handler is logged and isolated — it stops neither its siblings
/// nor the publisher, and `publish` itself never fails.
///
/// The bus offers no delivery guarantee beyond in-process invocation while
/// publishing: no persistence, no retry, no ordering across event kinds.
///
/// # Examples
///
/// ```rust,ignore
/// let bus = Arc::new(EventBus::new());
/// bus.subscribe(EventKind::SavedToStore, DispatchMode::Concurrent, handler);
/// bus.publish(event).await; // returns once every handler finished
/// ```
#[derive(Default)]
pub struct EventBus {
    sequential: RwLock<FxHashMap<EventKind, HandlerList>>,
    concurrent: RwLock<FxHashMap<EventKind, HandlerList>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe(&self, kind: EventKind, mode: DispatchMode, handler: Arc<dyn EventHandler>) {
        let registry = match mode {
            DispatchMode::Sequential => &self.sequential,
            DispatchMode::Concurrent => &self.concurrent,
        };
        registry
            .write()
            .expect("handler registry poisoned")
            .entry(kind)
            .or_default()
            .push(handler);
    }

    /// Number of handlers registered for `kind`, across both modes.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        let count = |registry: &RwLock<FxHashMap<EventKind, HandlerList>>| {
            registry
                .read()
                .expect("handler registry poisoned")
                .get(&kind)
                .map_or(0, Vec::len)
        };
        count(&self.sequential) + count(&self.concurrent)
    }

    /// Dispatch `event` to every handler registered for its kind.
    ///
    /// Returns after all handlers (sequential, then the concurrent fan-out)
    /// have completed or failed. Never panics or errors on a handler's
    /// behalf.
    pub async fn publish(&self, event: DomainEvent) {
        let kind = event.kind();

        // Clone the lists out so no lock is held across an await point.
        let sequential = self.handlers_for(&self.sequential, kind);
        let concurrent = self.handlers_for(&self.concurrent, kind);

        for handler in sequential {
            if let Err(err) = handler.handle(&event).await {
                error!(
                    event_kind = %kind,
                    job_id = %event.job_id(),
                    handler = handler.name(),
                    %err,
                    "sequential handler failed"
                );
            }
        }

        let fanned_out = concurrent.iter().map(|handler| {
            let event = &event;
            async move { (handler.name(), handler.handle(event).await) }
        });
        for (name, result) in join_all(fanned_out).await {
            if let Err(err) = result {
                error!(
                    event_kind = %kind,
                    job_id = %event.job_id(),
                    handler = name,
                    %err,
                    "concurrent handler failed"
                );
            }
        }
    }

    fn handlers_for(
        &self,
        registry: &RwLock<FxHashMap<EventKind, HandlerList>>,
        kind: EventKind,
    ) -> HandlerList {
        registry
            .read()
            .expect("handler registry poisoned")
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
