#![allow(dead_code)] // Shared across test binaries; each uses a subset of helpers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use core_router::{
    CurrentTaskFn, Event, EventDisposition, EventModule, EventRef, EventType, ModuleId, Router,
    TaskHandle,
};

/// Records every invocation and answers with a configurable disposition.
pub struct MockModule {
    name: &'static str,
    disposition: Mutex<EventDisposition>,
    calls: AtomicUsize,
    history: Mutex<Vec<EventRef>>,
    log: Option<Arc<Mutex<Vec<&'static str>>>>,
}

impl MockModule {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            disposition: Mutex::new(EventDisposition::Handled),
            calls: AtomicUsize::new(0),
            history: Mutex::new(Vec::new()),
            log: None,
        })
    }

    /// Like [`MockModule::new`], but every invocation also appends the module
    /// name to `log`, so tests can assert cross-module ordering.
    pub fn with_log(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            disposition: Mutex::new(EventDisposition::Handled),
            calls: AtomicUsize::new(0),
            history: Mutex::new(Vec::new()),
            log: Some(log),
        })
    }

    pub fn set_disposition(&self, disposition: EventDisposition) {
        *self.disposition.lock().unwrap() = disposition;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_event(&self) -> Option<EventRef> {
        self.history.lock().unwrap().last().copied()
    }
}

impl EventModule for MockModule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle(&self, _router: &Router, event: EventRef) -> EventDisposition {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.history.lock().unwrap().push(event);
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.name);
        }
        *self.disposition.lock().unwrap()
    }
}

/// A controllable current-task pointer. Installing its hook lets cross-task
/// scenarios run deterministically on one thread: the test "switches task"
/// between phases instead of coordinating real threads.
pub struct TaskSwitch {
    current: Arc<AtomicU64>,
}

impl TaskSwitch {
    pub fn new(initial: TaskHandle) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(initial.raw())),
        }
    }

    pub fn switch_to(&self, handle: TaskHandle) {
        self.current.store(handle.raw(), Ordering::SeqCst);
    }

    pub fn hook(&self) -> CurrentTaskFn {
        let current = Arc::clone(&self.current);
        Box::new(move || TaskHandle::new(current.load(Ordering::SeqCst)))
    }
}

/// Gives a test-local event the `'static` lifetime the router requires.
pub fn leak_event(event_type: EventType, producer: ModuleId) -> EventRef {
    Box::leak(Box::new(Event::new(event_type, producer)))
}
