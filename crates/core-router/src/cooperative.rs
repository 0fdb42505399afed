//! The cooperative single-loop engine.
//!
//! One task, no queues, no blocking. Sends land on a "deliver next" list; a
//! driver promotes that list with [`new_loop`] and drains events one at a
//! time through [`next_event`] + `call_handlers`. With a single consumer
//! context there is no separate return trip, so a sent event carries exactly
//! one reference for delivery-and-return combined, plus one per kept
//! reference.

use std::collections::VecDeque;
use std::ptr;
use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::Ordering;

use crate::Router;
use crate::error::router_assert;
use crate::event::EventRef;
use crate::module::EventDisposition;
use crate::options::SendOptions;

pub(crate) struct CooperativeBackend {
    lists: Mutex<Lists>,
}

#[derive(Default)]
struct Lists {
    /// Deliver during this iteration of the main loop.
    deliver_now: VecDeque<EventRef>,
    /// Deliver on the next iteration.
    deliver_next: VecDeque<EventRef>,
    /// Events which modules have kept. Diagnostic: an event that lingers here
    /// was kept and never returned.
    kept: Vec<EventRef>,
}

impl CooperativeBackend {
    pub(crate) fn new() -> Self {
        Self {
            lists: Mutex::new(Lists::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lists> {
        self.lists.lock().expect("cooperative list mutex poisoned")
    }

    pub(crate) fn is_idle(&self) -> bool {
        let lists = self.lock();
        lists.deliver_now.is_empty() && lists.deliver_next.is_empty() && lists.kept.is_empty()
    }

    pub(crate) fn kept_count(&self) -> usize {
        self.lock().kept.len()
    }
}

fn scheduled(list: &VecDeque<EventRef>, event: EventRef) -> bool {
    list.iter().any(|queued| ptr::eq(*queued, event))
}

pub(crate) fn send_ex(
    router: &Router,
    backend: &CooperativeBackend,
    event: EventRef,
    options: SendOptions,
) {
    router.check_sendable(event);
    router_assert!(
        router,
        !options.allow_resending,
        "the cooperative backend does not support resending"
    );
    let bit = router.registry.types().bit(event.event_type());
    router_assert!(
        router,
        !router.subscriptions.module_subscribed(event.producer().index(), bit),
        "module `{}` sends event type {} and also subscribes to it; it would receive its own event twice",
        router.registry.module_name(event.producer()),
        event.event_type().raw()
    );
    router_assert!(
        router,
        !event.is_in_flight(),
        "event of type {} is already in flight",
        event.event_type().raw()
    );

    let mut lists = backend.lock();
    router_assert!(
        router,
        !scheduled(&lists.deliver_now, event) && !scheduled(&lists.deliver_next, event),
        "event of type {} is already scheduled for delivery",
        event.event_type().raw()
    );
    // Schedule for the next loop iteration, even if only the producer ends up
    // seeing it.
    event.ref_count().fetch_add(1, Ordering::SeqCst);
    lists.deliver_next.push_back(event);
    tracing::trace!(
        target: "router.dispatch",
        event_type = event.event_type().raw(),
        "send (next loop)"
    );
}

pub(crate) fn call_handlers(router: &Router, backend: &CooperativeBackend, event: EventRef) {
    let event_type = event.event_type();
    router_assert!(
        router,
        router.registry.types().contains(event_type),
        "event type {} is not routable",
        event_type.raw()
    );

    let bit = router.registry.types().bit(event_type);
    for index in router.registry.task_modules(0) {
        // Checked at delivery time so unsubscription is instantaneous.
        if !router.subscriptions.module_subscribed(index, bit) {
            continue;
        }
        let entry = router.registry.module_entry(index);
        let disposition = entry.module.handle(router, event);
        tracing::trace!(
            target: "router.dispatch",
            module = entry.module.name(),
            event_type = event_type.raw(),
            ?disposition,
            "delivered"
        );
        if disposition == EventDisposition::Kept {
            // The module owes one return_to_sender for the kept event.
            event.ref_count().fetch_add(1, Ordering::SeqCst);
            let mut lists = backend.lock();
            if !lists.kept.iter().any(|kept| ptr::eq(*kept, event)) {
                lists.kept.push(event);
            }
        }
    }

    // This event no longer needs delivery this loop.
    backend
        .lock()
        .deliver_now
        .retain(|queued| !ptr::eq(*queued, event));

    return_to_sender(router, backend, event);
}

pub(crate) fn return_to_sender(router: &Router, backend: &CooperativeBackend, event: EventRef) {
    router.check_sendable(event);

    let new = event.ref_count().fetch_sub(1, Ordering::SeqCst) - 1;
    router_assert!(
        router,
        new >= 0,
        "event of type {} was returned more times than it was sent or kept",
        event.event_type().raw()
    );
    if new > 0 {
        // Some module kept the event and must return it explicitly.
        return;
    }

    backend.lock().kept.retain(|kept| !ptr::eq(*kept, event));
    event.release_claim();
    let entry = router.registry.module_entry(event.producer().index());
    tracing::trace!(
        target: "router.dispatch",
        module = entry.module.name(),
        event_type = event.event_type().raw(),
        "returned to sender"
    );
    entry.module.handle(router, event);
}

/// Promotes "deliver next" for this iteration. Events which were not
/// delivered during the previous loop stay at the head of "deliver now".
pub(crate) fn new_loop(backend: &CooperativeBackend) {
    let mut guard = backend.lock();
    let Lists {
        deliver_now,
        deliver_next,
        ..
    } = &mut *guard;
    deliver_now.extend(deliver_next.drain(..));
}

/// The next event scheduled for delivery this loop, if any.
pub(crate) fn next_event(backend: &CooperativeBackend) -> Option<EventRef> {
    backend.lock().deliver_now.pop_front()
}
