//! The routable unit and its lifecycle fields.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::module::ModuleId;

/// Identifies one routable event type.
///
/// Routable values form a contiguous non-negative range chosen in
/// [`RouterOptions`](crate::RouterOptions); the value one below the first
/// routable type is conventionally reserved as an invalid sentinel, so
/// applications that enumerate their types can keep a "not an event" entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventType(i32);

impl EventType {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }
}

/// An event reference as it travels through the router.
///
/// Events are shared by reference, never copied, and must outlive every send
/// that involves them; the `'static` bound encodes that requirement. Producers
/// typically place events (and any payload beside them) in statics, which
/// [`Event::new`] being `const` makes straightforward.
pub type EventRef = &'static Event;

/// The fields the router needs to route an event and return it to its
/// producer. Applications embed an `Event` next to their payload; the router
/// never inspects anything beyond these fields.
#[derive(Debug)]
pub struct Event {
    event_type: EventType,
    producer: ModuleId,
    ref_count: AtomicI32,
    claim: AtomicBool,
}

impl Event {
    /// Creates an idle event owned by `producer`.
    pub const fn new(event_type: EventType, producer: ModuleId) -> Self {
        Self {
            event_type,
            producer,
            ref_count: AtomicI32::new(0),
            claim: AtomicBool::new(false),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// The module that owns this event and receives it back after delivery.
    pub fn producer(&self) -> ModuleId {
        self.producer
    }

    /// True while the event is being delivered to subscribers or returned to
    /// its producer. Only the producing module should call this; other
    /// modules cannot act on the answer without racing.
    pub fn is_in_flight(&self) -> bool {
        self.ref_count.load(Ordering::SeqCst) != 0
    }

    /// Attempts to claim the event for mutation prior to a send from a task
    /// that does not own it. Returns true if the claim was taken.
    ///
    /// A successful claim is released implicitly when the event next becomes
    /// idle; there is no explicit unclaim. Claiming never blocks, so it is
    /// safe in interrupt context and cannot introduce deadlock.
    pub fn try_claim(&self) -> bool {
        !self.claim.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn release_claim(&self) {
        self.claim.store(false, Ordering::SeqCst);
    }

    pub(crate) fn ref_count(&self) -> &AtomicI32 {
        &self.ref_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_is_idle_and_unclaimed() {
        let event = Event::new(EventType::new(3), ModuleId::new(0));
        assert!(!event.is_in_flight());
        assert!(event.try_claim());
    }

    #[test]
    fn claim_is_exclusive_until_released() {
        let event = Event::new(EventType::new(0), ModuleId::new(1));
        assert!(event.try_claim());
        assert!(!event.try_claim());
        event.release_claim();
        assert!(event.try_claim());
    }

    #[test]
    fn in_flight_tracks_the_reference_count() {
        let event = Event::new(EventType::new(0), ModuleId::new(0));
        event.ref_count().store(2, Ordering::SeqCst);
        assert!(event.is_in_flight());
        event.ref_count().store(0, Ordering::SeqCst);
        assert!(!event.is_in_flight());
    }
}
