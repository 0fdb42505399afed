//! Construction-time configuration.
//!
//! A router's task list, module partition, and event-type range are frozen by
//! the constructor and never change afterwards. The option hooks exist for
//! two audiences: embedders (interrupt detection, error logging) and tests
//! (current-task and queue-send overrides, which let cross-task scenarios run
//! deterministically on one thread).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread;

use crate::event::EventRef;
use crate::module::EventModule;

/// Identifies the scheduling context a task runs in.
///
/// The router only compares handles for equality, so any scheme that gives
/// each task a distinct value works. [`TaskHandle::current`] derives one from
/// the calling thread's identity; tests fabricate handles with
/// [`TaskHandle::new`] and steer them through the current-task override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The handle of the calling thread.
    pub fn current() -> Self {
        let mut hasher = DefaultHasher::new();
        thread::current().id().hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// Returns true when the current execution context is an interrupt service
/// routine (or the host equivalent of one). In interrupt context the router
/// never blocks: queue pushes become non-blocking and a full queue is fatal.
pub type IsInIsrFn = Box<dyn Fn() -> bool + Send + Sync>;

/// Replaces [`TaskHandle::current`] as the current-task accessor.
pub type CurrentTaskFn = Box<dyn Fn() -> TaskHandle + Send + Sync>;

/// Replaces the queue push in the threaded backend. Receives the index of the
/// destination task and the event being delivered. This is the seam by which
/// an RTOS queue primitive would be substituted, and by which tests capture
/// dispatch decisions.
pub type QueueSendFn = Box<dyn Fn(usize, EventRef) + Send + Sync>;

/// Invoked with diagnostic context immediately before the router aborts on a
/// contract violation.
pub type ErrorLogFn = Box<dyn Fn(&str) + Send + Sync>;

/// Describes one task that participates in event routing.
pub struct TaskConfig {
    /// Used for logging and diagnostics.
    pub name: &'static str,
    /// Identity of the thread (or fabricated context) that runs this task's
    /// driver loop.
    pub handle: TaskHandle,
    /// Capacity of this task's delivery queue. Ignored by the cooperative
    /// backend, which delivers through lists rather than queues.
    pub queue_capacity: usize,
    /// The modules this task owns, in delivery order. A module belongs to
    /// exactly one task.
    pub modules: Vec<Arc<dyn EventModule>>,
}

/// Customizes [`Router::send_ex`](crate::Router::send_ex).
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Permits re-sending an event that is already in flight. All subscribers
    /// receive the event one time for each send and re-send; the producing
    /// module receives it back *once*, after all subscribers are done, so the
    /// producer can keep using the event as a proxy for ownership.
    ///
    /// When true, every call must occur either in the task that owns the
    /// event's producer or in interrupt context; the router checks this and
    /// aborts if violated. Not supported by the cooperative backend.
    pub allow_resending: bool,
}

/// Everything a router needs to be built. Tasks are listed from highest
/// priority to lowest; dispatch follows that order.
pub struct RouterOptions {
    pub tasks: Vec<TaskConfig>,
    /// First routable event type value; must be non-negative.
    pub first_event_type: i32,
    /// Number of routable event types, starting at `first_event_type`.
    pub num_event_types: usize,
    /// Interrupt detection. Defaults to "never in interrupt context".
    pub is_in_isr: Option<IsInIsrFn>,
    /// Current-task override for tests. Defaults to [`TaskHandle::current`].
    pub current_task: Option<CurrentTaskFn>,
    /// Queue-send override for tests and RTOS embedders.
    pub queue_send: Option<QueueSendFn>,
    /// Error logger consulted before aborting.
    pub error_log: Option<ErrorLogFn>,
}

impl RouterOptions {
    pub fn new(first_event_type: i32, num_event_types: usize) -> Self {
        Self {
            tasks: Vec::new(),
            first_event_type,
            num_event_types,
            is_in_isr: None,
            current_task: None,
            queue_send: None,
            error_log: None,
        }
    }

    /// Appends a task; tasks are dispatched in the order they were added.
    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.tasks.push(task);
        self
    }
}
