//! The threaded dispatch engine.
//!
//! Destination tasks are selected and the reference count is bumped *before*
//! anything is pushed. Between selection and the last push, a subscriber on a
//! higher-priority task can pop the event, fully process it, and call
//! [`return_to_sender`], driving the count down; pre-paying the count keeps it
//! from touching zero mid-dispatch, which would spuriously return the event.
//!
//! The count's meaning: one unit per queued or in-progress delivery, one unit
//! per kept reference, plus one standing reservation for the return-to-sender
//! hop. The reservation is taken when an idle event is sent and consumed by
//! whichever holder decrements last.

use std::sync::atomic::Ordering;
use std::time::Duration;

use core_queue::SyncQueue;

use crate::Router;
use crate::error::router_assert;
use crate::event::EventRef;
use crate::module::EventDisposition;
use crate::options::SendOptions;

pub(crate) struct ThreadedBackend {
    /// One delivery queue per task, in task order.
    pub(crate) queues: Vec<SyncQueue<EventRef>>,
}

pub(crate) fn send_ex(
    router: &Router,
    backend: &ThreadedBackend,
    event: EventRef,
    options: SendOptions,
) {
    router.check_sendable(event);
    let event_type = event.event_type();
    let bit = router.registry.types().bit(event_type);
    router_assert!(
        router,
        !router.subscriptions.module_subscribed(event.producer().index(), bit),
        "module `{}` sends event type {} and also subscribes to it; it would receive its own event twice",
        router.registry.module_name(event.producer()),
        event_type.raw()
    );

    // Select destination tasks while the event is still unpublished.
    let num_tasks = router.registry.num_tasks();
    let mut mask: u32 = 0;
    let mut marked: i32 = 0;
    for task in 0..num_tasks {
        if router.subscriptions.task_subscribed(task, bit) {
            mask |= 1u32 << task;
            marked += 1;
        }
    }

    let old = event.ref_count().fetch_add(marked, Ordering::SeqCst);
    router_assert!(router, old >= 0, "event reference count was negative ({old})");

    let producer_task = router.registry.task_of(event.producer());
    if old == 0 {
        // Idle event: reserve the return-to-sender hop.
        event.ref_count().fetch_add(1, Ordering::SeqCst);
        if marked == 0 {
            // No subscribers anywhere; the event goes straight home.
            deliver(router, backend, producer_task, event);
            return;
        }
    } else {
        router_assert!(
            router,
            options.allow_resending,
            "event of type {} is already in flight; resending requires allow_resending",
            event_type.raw()
        );
        let in_producer_task = router.current_task_index() == Some(producer_task);
        router_assert!(
            router,
            in_producer_task || router.in_isr(),
            "resending is only allowed from the producer's task or an interrupt"
        );
        if old == 1 {
            // The previous send has committed its final decrement; a return
            // trip is en route to (or already queued at) the producer's task.
            if marked == 0 {
                // That return also covers this send's return obligation.
                return;
            }
            if mask & (1u32 << producer_task) != 0 {
                // The queued return entry doubles as this send's delivery to
                // the producer's task; keep the net +1 and skip the push.
                mask &= !(1u32 << producer_task);
            } else {
                // Pay for a fresh return trip.
                event.ref_count().fetch_add(1, Ordering::SeqCst);
            }
        }
        // old > 1: the standing reservation has not been consumed yet.
    }

    tracing::trace!(
        target: "router.dispatch",
        event_type = event_type.raw(),
        tasks = mask.count_ones(),
        resend = old != 0,
        "send"
    );
    for task in 0..num_tasks {
        if mask & (1u32 << task) != 0 {
            deliver(router, backend, task, event);
        }
    }
}

pub(crate) fn call_handlers(router: &Router, backend: &ThreadedBackend, event: EventRef) {
    let event_type = event.event_type();
    router_assert!(
        router,
        router.registry.types().contains(event_type),
        "event type {} is not routable",
        event_type.raw()
    );
    let Some(task) = router.current_task_index() else {
        router.fatal(format_args!(
            "call_handlers invoked from a context that is not a routing task"
        ));
    };

    // A count of one means this arrival is the return-to-sender hop: the
    // event was queued here solely so the producer's handler can run.
    if event.ref_count().load(Ordering::SeqCst) > 1 {
        let bit = router.registry.types().bit(event_type);
        for index in router.registry.task_modules(task) {
            // Checked at delivery time, not enqueue time, so unsubscription
            // takes effect immediately even for events already queued.
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
                // The module now owes exactly one return_to_sender call.
                event.ref_count().fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    return_to_sender(router, backend, event);
}

pub(crate) fn return_to_sender(router: &Router, backend: &ThreadedBackend, event: EventRef) {
    router.check_sendable(event);

    let new = event.ref_count().fetch_sub(1, Ordering::SeqCst) - 1;
    router_assert!(
        router,
        new >= 0,
        "event of type {} was returned more times than it was sent or kept",
        event.event_type().raw()
    );
    if new > 1 {
        // Other holders remain.
        return;
    }
    let producer_task = router.registry.task_of(event.producer());
    if new == 1 {
        if router.current_task_index() != Some(producer_task) {
            // Hand the event home and stop touching it. The producer's task
            // may drain its queue at any moment; decrementing here as well
            // could zero the count and deliver the return twice.
            deliver(router, backend, producer_task, event);
            return;
        }
        // Already in the producer's task: fold the queue hop away, as if the
        // event had been enqueued and immediately dequeued.
        let folded = event.ref_count().fetch_sub(1, Ordering::SeqCst) - 1;
        router_assert!(
            router,
            folded >= 0,
            "event of type {} was returned more times than it was sent or kept",
            event.event_type().raw()
        );
    }
    if event.ref_count().load(Ordering::SeqCst) == 0 {
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
}

pub(crate) fn receive(router: &Router, backend: &ThreadedBackend) -> EventRef {
    backend.queues[receive_task(router)].pop()
}

pub(crate) fn timed_receive(
    router: &Router,
    backend: &ThreadedBackend,
    timeout: Duration,
) -> Option<EventRef> {
    backend.queues[receive_task(router)].timed_pop(timeout)
}

fn receive_task(router: &Router) -> usize {
    router_assert!(
        router,
        !router.in_isr(),
        "receive must not be called from an interrupt"
    );
    let Some(task) = router.current_task_index() else {
        router.fatal(format_args!(
            "receive invoked from a context that is not a routing task"
        ));
    };
    task
}

fn deliver(router: &Router, backend: &ThreadedBackend, task: usize, event: EventRef) {
    if let Some(send) = &router.queue_send {
        send(task, event);
        return;
    }
    let queue = &backend.queues[task];
    if router.in_isr() {
        // Interrupts must never block; a full queue here is a sizing bug.
        if queue.try_push(event).is_err() {
            router.fatal(format_args!(
                "task `{}` queue is full; interrupt context cannot block",
                router.registry.task(task).name
            ));
        }
    } else {
        queue.push(event);
    }
}
