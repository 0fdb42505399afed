//! Cooperative-backend behavior: the single-loop lifecycle, kept events, and
//! the send/deliver/return contract checks.

mod common;

use std::ptr;
use std::sync::{Arc, Mutex};

use common::{MockModule, leak_event};
use core_router::{
    ConfigError, EventDisposition, EventModule, EventType, ModuleId, Router, RouterOptions,
    TaskConfig, TaskHandle,
};

const X: EventType = EventType::new(0);
const Y: EventType = EventType::new(1);
const PRODUCER: ModuleId = ModuleId::new(0);
const CONSUMER: ModuleId = ModuleId::new(1);

fn single_loop_router(a: Arc<MockModule>, b: Arc<MockModule>) -> Router {
    let options = RouterOptions::new(0, 2).with_task(TaskConfig {
        name: "main-loop",
        handle: TaskHandle::new(1),
        queue_capacity: 1,
        modules: vec![a as Arc<dyn EventModule>, b as Arc<dyn EventModule>],
    });
    Router::cooperative(options).expect("valid cooperative configuration")
}

#[test]
fn delivers_to_subscriber_then_returns_to_sender() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = MockModule::with_log("producer", Arc::clone(&log));
    let b = MockModule::with_log("consumer", Arc::clone(&log));
    let router = single_loop_router(Arc::clone(&a), Arc::clone(&b));
    router.subscribe(CONSUMER, X);

    let event = leak_event(X, PRODUCER);
    router.send(event);
    assert!(event.is_in_flight());

    router.new_loop();
    let next = router.next_event().expect("event scheduled for this loop");
    assert!(ptr::eq(next, event));
    router.call_handlers(next);

    assert_eq!(*log.lock().unwrap(), vec!["consumer", "producer"]);
    assert!(!event.is_in_flight());
    assert!(router.next_event().is_none());
    router.deinit();
}

#[test]
fn event_is_reusable_after_each_round_trip() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(Arc::clone(&a), Arc::clone(&b));
    router.subscribe(CONSUMER, X);

    let event = leak_event(X, PRODUCER);
    for round in 1..=2 {
        router.send(event);
        router.new_loop();
        let next = router.next_event().expect("event scheduled");
        router.call_handlers(next);
        assert_eq!(b.call_count(), round);
        assert_eq!(a.call_count(), round);
        assert!(!event.is_in_flight());
        assert!(router.next_event().is_none());
    }
}

#[test]
fn delivers_distinct_events_in_send_order() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(Arc::clone(&a), Arc::clone(&b));
    router.subscribe(CONSUMER, X);
    router.subscribe(CONSUMER, Y);

    let first = leak_event(X, PRODUCER);
    let second = leak_event(Y, PRODUCER);
    router.send(first);
    router.send(second);

    router.new_loop();
    let delivered = router.next_event().expect("first event");
    assert!(ptr::eq(delivered, first));
    router.call_handlers(delivered);
    let delivered = router.next_event().expect("second event");
    assert!(ptr::eq(delivered, second));
    router.call_handlers(delivered);
    assert!(router.next_event().is_none());
    assert_eq!(b.call_count(), 2);
    assert_eq!(a.call_count(), 2);
}

#[test]
fn zero_subscribers_returns_straight_to_producer() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(Arc::clone(&a), Arc::clone(&b));

    let event = leak_event(X, PRODUCER);
    router.send(event);
    router.new_loop();
    let next = router.next_event().expect("event scheduled");
    router.call_handlers(next);

    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 0);
    assert!(!event.is_in_flight());
}

#[test]
fn kept_event_defers_the_return() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(Arc::clone(&a), Arc::clone(&b));
    router.subscribe(CONSUMER, X);
    b.set_disposition(EventDisposition::Kept);

    let event = leak_event(X, PRODUCER);
    router.send(event);
    router.new_loop();
    let next = router.next_event().expect("event scheduled");
    router.call_handlers(next);

    // The consumer holds the event; the producer has not seen it back.
    assert!(event.is_in_flight());
    assert_eq!(a.call_count(), 0);
    assert_eq!(router.kept_event_count(), 1);

    // The keeper finishes with the event.
    router.return_to_sender(event);
    assert_eq!(a.call_count(), 1);
    assert!(!event.is_in_flight());
    assert_eq!(router.kept_event_count(), 0);
    router.deinit();
}

#[test]
fn undelivered_events_carry_over_to_the_next_loop() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(Arc::clone(&a), Arc::clone(&b));
    router.subscribe(CONSUMER, X);
    router.subscribe(CONSUMER, Y);

    let first = leak_event(X, PRODUCER);
    let second = leak_event(Y, PRODUCER);
    router.send(first);
    router.send(second);
    router.new_loop();

    // The driver only gets through one event this iteration.
    let delivered = router.next_event().expect("first event");
    router.call_handlers(delivered);

    router.new_loop();
    let leftover = router.next_event().expect("second event survives the loop boundary");
    assert!(ptr::eq(leftover, second));
    router.call_handlers(leftover);
    assert_eq!(b.call_count(), 2);
}

#[test]
fn unsubscribe_before_delivery_suppresses_it() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(Arc::clone(&a), Arc::clone(&b));
    router.subscribe(CONSUMER, X);

    let event = leak_event(X, PRODUCER);
    router.send(event);
    // The event is scheduled, but the consumer changes its mind before the
    // loop runs.
    router.unsubscribe(CONSUMER, X);

    router.new_loop();
    let next = router.next_event().expect("event scheduled");
    router.call_handlers(next);

    assert_eq!(b.call_count(), 0);
    assert_eq!(a.call_count(), 1);
    assert!(!event.is_in_flight());
}

#[test]
fn subscribe_then_unsubscribe_round_trips_to_no_deliveries() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(Arc::clone(&a), Arc::clone(&b));
    router.subscribe(CONSUMER, X);
    router.unsubscribe(CONSUMER, X);

    let event = leak_event(X, PRODUCER);
    router.send(event);
    router.new_loop();
    router.call_handlers(router.next_event().expect("event scheduled"));
    assert_eq!(b.call_count(), 0);
    assert_eq!(a.call_count(), 1);
}

#[test]
fn rejects_multi_task_configurations() {
    let task = |name| TaskConfig {
        name,
        handle: TaskHandle::current(),
        queue_capacity: 1,
        modules: vec![MockModule::new(name) as Arc<dyn EventModule>],
    };
    let options = RouterOptions::new(0, 1)
        .with_task(task("one"))
        .with_task(task("two"));
    // Both tasks report the current thread's handle, but the task-count check
    // fires first.
    match Router::cooperative(options) {
        Err(ConfigError::CooperativeTaskCount(2)) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("two tasks must not build a cooperative router"),
    }
}

#[test]
#[should_panic(expected = "already in flight")]
fn resending_an_in_flight_event_is_fatal() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(a, b);
    let event = leak_event(X, PRODUCER);
    router.send(event);
    router.send(event);
}

#[test]
#[should_panic(expected = "subscribes to it")]
fn producers_may_not_subscribe_to_their_own_type() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(a, b);
    router.subscribe(PRODUCER, X);
    let event = leak_event(X, PRODUCER);
    router.send(event);
}

#[test]
#[should_panic(expected = "returned more times")]
fn returning_an_idle_event_is_fatal() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(a, b);
    let event = leak_event(X, PRODUCER);
    router.return_to_sender(event);
}

#[test]
#[should_panic(expected = "is not routable")]
fn sending_an_unroutable_type_is_fatal() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(a, b);
    let event = leak_event(EventType::new(7), PRODUCER);
    router.send(event);
}

#[test]
#[should_panic(expected = "still scheduled")]
fn deinit_with_scheduled_events_is_fatal() {
    let a = MockModule::new("producer");
    let b = MockModule::new("consumer");
    let router = single_loop_router(a, b);
    let event = leak_event(X, PRODUCER);
    router.send(event);
    router.deinit();
}
