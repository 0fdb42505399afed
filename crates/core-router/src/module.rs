//! Modules: the units of code that produce and consume events.

use crate::Router;
use crate::event::EventRef;

/// Identifies a module: an opaque index into the task-ordered module list
/// passed at construction. The registry resolves it; applications treat it as
/// a handle and usually keep one `const` per module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(usize);

impl ModuleId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

/// What a handler did with a delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// The handler did not expect an event of this type. An error may have
    /// occurred, or the event was in transit when the module unsubscribed.
    /// Diagnostic only; the router treats it like `Handled`.
    Unexpected,
    /// The handler is done with the event; it may be returned to its
    /// producer.
    Handled,
    /// The handler retained a reference to the event. The router will not
    /// return it on the handler's behalf; the module must call
    /// [`Router::return_to_sender`] exactly once when it is done.
    Kept,
}

/// A unit of code that sends and/or receives events.
///
/// The same `handle` entry point serves two purposes: delivery of subscribed
/// events, and (for events this module produces) the return-to-sender
/// callback once every consumer has finished. Producers distinguish the two
/// by recognizing their own events.
///
/// Handlers receive the router so they can send, subscribe, or return kept
/// events from inside a callback.
pub trait EventModule: Send + Sync {
    /// Stable identifier used for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Receives an event. Must not block on other events of the same type.
    fn handle(&self, router: &Router, event: EventRef) -> EventDisposition;
}
