//! In-process event routing between statically configured modules.
//!
//! The router transports events sent by one module to every module that
//! subscribes to that event's type, then returns each event to the module
//! that sent it. It does so by maintaining a frozen map set at construction:
//!
//! ```text
//!                 event types -> modules -> tasks -> queues
//! ```
//!
//! Interest is tracked with a subscription metaphor: modules subscribe to
//! event types and unsubscribe from them at any time with
//! [`Router::subscribe`] and its counterpart.
//!
//! # Ownership
//!
//! Tasks own modules, and modules own events:
//!
//! ```text
//!                 task ----> module ----> event
//! ```
//!
//! Each event is owned by exactly one module, which is owned by exactly one
//! task in turn. An event's "owning task" below is shorthand for the task
//! that owns the module that owns the event. Modules should give their events
//! the `'static` lifetime the router requires by placing them in statics
//! ([`Event::new`] is `const` for exactly this reason).
//!
//! # Event lifecycle
//!
//! Events are *idle* when created and *in flight* from the moment they are
//! sent until the router hands them back to their producer. In between, the
//! event is delivered to every subscribing module; the producer's own handler
//! runs last, which tells the producer that all consumers are done and the
//! event may be modified and sent again. Only idle events may be sent.
//!
//! This lifecycle is what lets senders pass events by reference without
//! copying: while an event is in flight, consumers may read it and the
//! producer keeps its hands off.
//!
//! # Claiming events
//!
//! Sending an event from a task other than its owning task needs one extra
//! step to avoid two contexts mutating the payload at once: claim the event
//! with [`Event::try_claim`], and only modify and send it if the claim
//! succeeded. The claim is released automatically when the event next becomes
//! idle. Inside the owning task, [`Event::is_in_flight`] is usually enough;
//! if an event is *ever* sent from outside its owning task, every sender of
//! that event should use the claim protocol.
//!
//! # Keeping events
//!
//! A subscriber that needs an event past the end of its handler returns
//! [`EventDisposition::Kept`] and later calls [`Router::return_to_sender`]
//! exactly once. Until it does, the event stays in flight. One use is a
//! barrier: a producer sends an event, every subscriber keeps it until it
//! finishes preparing, and the producer knows everyone is ready when the
//! event comes back.
//!
//! # Backends
//!
//! [`Router::threaded`] runs each task on its own thread with a bounded
//! blocking delivery queue; drivers loop on [`Router::receive`] /
//! [`Router::timed_receive`] and [`Router::call_handlers`].
//! [`Router::cooperative`] runs everything on a single loop without blocking;
//! drivers call [`Router::new_loop`] then drain [`Router::next_event`]. The
//! routing semantics are identical; only transport differs.
//!
//! # Errors
//!
//! Malformed configuration is reported by the constructors as
//! [`ConfigError`]. Everything after construction (sending an unroutable
//! type, resending without permission, unbalanced returns) is a contract
//! violation and aborts after logging (see [`RouterOptions::error_log`]).

mod bitmap;
mod cooperative;
mod dispatch;
mod error;
mod event;
mod module;
mod options;
mod registry;
mod subscription;

pub use error::ConfigError;
pub use event::{Event, EventRef, EventType};
pub use module::{EventDisposition, EventModule, ModuleId};
pub use options::{
    CurrentTaskFn, ErrorLogFn, IsInIsrFn, QueueSendFn, RouterOptions, SendOptions, TaskConfig,
    TaskHandle,
};
pub use registry::MAX_TASKS;

use std::fmt;
use std::time::Duration;

use core_queue::SyncQueue;

use crate::cooperative::CooperativeBackend;
use crate::dispatch::ThreadedBackend;
use crate::error::router_assert;
use crate::registry::Registry;
use crate::subscription::SubscriptionMatrix;

/// The event router. All methods take `&self`; share it across task threads
/// with an `Arc`.
pub struct Router {
    pub(crate) registry: Registry,
    pub(crate) subscriptions: SubscriptionMatrix,
    backend: Backend,
    pub(crate) queue_send: Option<QueueSendFn>,
    is_in_isr: Option<IsInIsrFn>,
    current_task: Option<CurrentTaskFn>,
    error_log: Option<ErrorLogFn>,
}

enum Backend {
    Threaded(ThreadedBackend),
    Cooperative(CooperativeBackend),
}

impl Router {
    /// Builds a router whose tasks are OS threads draining blocking queues.
    pub fn threaded(options: RouterOptions) -> Result<Self, ConfigError> {
        for task in &options.tasks {
            if task.queue_capacity == 0 {
                return Err(ConfigError::ZeroQueueCapacity(task.name));
            }
        }
        Self::build(options, BackendKind::Threaded)
    }

    /// Builds a router for a single cooperative loop: one task, no queues,
    /// no blocking.
    pub fn cooperative(options: RouterOptions) -> Result<Self, ConfigError> {
        if options.tasks.len() != 1 {
            return Err(ConfigError::CooperativeTaskCount(options.tasks.len()));
        }
        Self::build(options, BackendKind::Cooperative)
    }

    fn build(options: RouterOptions, kind: BackendKind) -> Result<Self, ConfigError> {
        let RouterOptions {
            tasks,
            first_event_type,
            num_event_types,
            is_in_isr,
            current_task,
            queue_send,
            error_log,
        } = options;
        let registry = Registry::build(tasks, first_event_type, num_event_types)?;
        let subscriptions = SubscriptionMatrix::new(
            registry.num_modules(),
            registry.num_tasks(),
            registry.types().count(),
        );
        let (backend, backend_name) = match kind {
            BackendKind::Threaded => (
                Backend::Threaded(ThreadedBackend {
                    queues: registry
                        .tasks()
                        .map(|task| SyncQueue::new(task.queue_capacity))
                        .collect(),
                }),
                "threaded",
            ),
            BackendKind::Cooperative => {
                (Backend::Cooperative(CooperativeBackend::new()), "cooperative")
            }
        };
        tracing::info!(
            target: "router",
            tasks = registry.num_tasks(),
            modules = registry.num_modules(),
            event_types = registry.types().count(),
            backend = backend_name,
            "initialized"
        );
        Ok(Self {
            registry,
            subscriptions,
            backend,
            queue_send,
            is_in_isr,
            current_task,
            error_log,
        })
    }

    /// Delivers `event` to every module subscribed to its type, then returns
    /// it to the sending module. Safe to call from any task or from an
    /// interrupt. Fatal if the event is already in flight; see
    /// [`Router::send_ex`] for resending.
    pub fn send(&self, event: EventRef) {
        self.send_ex(event, SendOptions::default());
    }

    /// [`Router::send`] with knobs. Read the [`SendOptions`] documentation
    /// carefully: each flag trades one restriction for another.
    pub fn send_ex(&self, event: EventRef, options: SendOptions) {
        match &self.backend {
            Backend::Threaded(backend) => dispatch::send_ex(self, backend, event, options),
            Backend::Cooperative(backend) => cooperative::send_ex(self, backend, event, options),
        }
    }

    /// Delivers `event` to the handlers of every module in the current task
    /// which should see it, then forwards it along its return path. Call
    /// exactly once per event received from this task's queue (or from
    /// [`Router::next_event`]); calling it more or less than that is an
    /// error.
    pub fn call_handlers(&self, event: EventRef) {
        match &self.backend {
            Backend::Threaded(backend) => dispatch::call_handlers(self, backend, event),
            Backend::Cooperative(backend) => cooperative::call_handlers(self, backend, event),
        }
    }

    /// Releases one hold on `event`. A module calls this exactly once for
    /// each event it kept (see [`EventDisposition::Kept`]); the router calls
    /// it internally after every delivery. The final release hands the event
    /// back to its producer.
    pub fn return_to_sender(&self, event: EventRef) {
        match &self.backend {
            Backend::Threaded(backend) => dispatch::return_to_sender(self, backend, event),
            Backend::Cooperative(backend) => cooperative::return_to_sender(self, backend, event),
        }
    }

    /// Blocks until the next event sent to the current task arrives. Fatal
    /// from an interrupt or from a thread that is not a routing task.
    /// Threaded backend only.
    pub fn receive(&self) -> EventRef {
        match &self.backend {
            Backend::Threaded(backend) => dispatch::receive(self, backend),
            Backend::Cooperative(_) => self.fatal(format_args!(
                "receive is not supported by the cooperative backend; use new_loop/next_event"
            )),
        }
    }

    /// Like [`Router::receive`] but gives up after `timeout`, returning
    /// `None`. Expiry is an expected outcome, not an error.
    pub fn timed_receive(&self, timeout: Duration) -> Option<EventRef> {
        match &self.backend {
            Backend::Threaded(backend) => dispatch::timed_receive(self, backend, timeout),
            Backend::Cooperative(_) => self.fatal(format_args!(
                "timed_receive is not supported by the cooperative backend; use new_loop/next_event"
            )),
        }
    }

    /// Starts a new iteration of the cooperative main loop, promoting events
    /// scheduled during the previous iteration. Cooperative backend only.
    pub fn new_loop(&self) {
        match &self.backend {
            Backend::Cooperative(backend) => cooperative::new_loop(backend),
            Backend::Threaded(_) => self.fatal(format_args!(
                "new_loop is not supported by the threaded backend; use receive"
            )),
        }
    }

    /// Returns events scheduled for delivery this loop. Call in a loop until
    /// it returns `None`, passing each event to [`Router::call_handlers`].
    /// Events not drained this loop are delivered on a later one. Never
    /// blocks. Cooperative backend only.
    pub fn next_event(&self) -> Option<EventRef> {
        match &self.backend {
            Backend::Cooperative(backend) => cooperative::next_event(backend),
            Backend::Threaded(_) => self.fatal(format_args!(
                "next_event is not supported by the threaded backend; use receive"
            )),
        }
    }

    /// The number of events currently kept by modules. Diagnostic: an event
    /// stuck at a nonzero count was kept and never returned. Cooperative
    /// backend only.
    pub fn kept_event_count(&self) -> usize {
        match &self.backend {
            Backend::Cooperative(backend) => backend.kept_count(),
            Backend::Threaded(_) => self.fatal(format_args!(
                "the kept-event diagnostic is only tracked by the cooperative backend"
            )),
        }
    }

    /// Routes all future events of `event_type` to `module`'s handler until
    /// it unsubscribes. No module is subscribed to anything at construction.
    ///
    /// Call from the task that owns `module`, not from an interrupt or a
    /// callback.
    pub fn subscribe(&self, module: ModuleId, event_type: EventType) {
        let (bit, task) = self.subscription_target(module, event_type);
        self.subscriptions.subscribe(module.index(), task, bit);
        tracing::debug!(
            target: "router.subscription",
            module = self.registry.module_name(module),
            event_type = event_type.raw(),
            "subscribed"
        );
    }

    /// Stops routing events of `event_type` to `module`, effective
    /// immediately: an event of that type already queued to the module's task
    /// skips the module at delivery time.
    ///
    /// Call from the task that owns `module`, not from an interrupt or a
    /// callback.
    pub fn unsubscribe(&self, module: ModuleId, event_type: EventType) {
        let (bit, task) = self.subscription_target(module, event_type);
        self.subscriptions
            .unsubscribe(module.index(), task, self.registry.task_modules(task), bit);
        tracing::debug!(
            target: "router.subscription",
            module = self.registry.module_name(module),
            event_type = event_type.raw(),
            "unsubscribed"
        );
    }

    /// Tears the router down. Fatal if any events are still queued, scheduled,
    /// or kept; finish in-flight traffic first.
    pub fn deinit(self) {
        match &self.backend {
            Backend::Threaded(backend) => {
                for (index, queue) in backend.queues.iter().enumerate() {
                    router_assert!(
                        self,
                        queue.is_empty(),
                        "task `{}` still has queued events",
                        self.registry.task(index).name
                    );
                }
            }
            Backend::Cooperative(backend) => {
                router_assert!(
                    self,
                    backend.is_idle(),
                    "events are still scheduled for delivery or kept"
                );
            }
        }
        tracing::info!(target: "router", "deinitialized");
    }

    fn subscription_target(&self, module: ModuleId, event_type: EventType) -> (usize, usize) {
        router_assert!(
            self,
            self.registry.is_module(module),
            "module id {} is not registered",
            module.index()
        );
        router_assert!(
            self,
            self.registry.types().contains(event_type),
            "event type {} is not routable",
            event_type.raw()
        );
        (
            self.registry.types().bit(event_type),
            self.registry.task_of(module),
        )
    }

    /// The index of the routing task the caller is running in, if any.
    pub(crate) fn current_task_index(&self) -> Option<usize> {
        let handle = match &self.current_task {
            Some(current) => current(),
            None => TaskHandle::current(),
        };
        self.registry.task_by_handle(handle)
    }

    pub(crate) fn in_isr(&self) -> bool {
        self.is_in_isr.as_ref().is_some_and(|hook| hook())
    }

    /// Checks that `event` can be delivered and returned: routable type,
    /// registered producer.
    pub(crate) fn check_sendable(&self, event: EventRef) {
        router_assert!(
            self,
            self.registry.types().contains(event.event_type()),
            "event type {} is not routable",
            event.event_type().raw()
        );
        router_assert!(
            self,
            self.registry.is_module(event.producer()),
            "event producer {} is not a registered module",
            event.producer().index()
        );
    }

    /// Contract violations are unrecoverable: log through the configured hook
    /// and `tracing`, then abort.
    pub(crate) fn fatal(&self, message: fmt::Arguments<'_>) -> ! {
        let rendered = message.to_string();
        if let Some(log) = &self.error_log {
            log(&rendered);
        }
        tracing::error!(target: "router", "{}", rendered);
        panic!("event router contract violation: {rendered}");
    }
}

#[derive(Clone, Copy)]
enum BackendKind {
    Threaded,
    Cooperative,
}
