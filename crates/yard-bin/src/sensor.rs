//! The sensor data publisher: owns the sensor-data event and publishes a
//! fresh reading each tick.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use core_router::{Event, EventDisposition, EventModule, EventRef, ModuleId, Router};

use crate::events;

/// The sensor-data event and its payload. The event must outlive every send,
/// so the whole record lives in a static; the payload fields sit in atomics
/// beside it so subscribers on other tasks can read them while the event is
/// in flight.
pub struct SensorReadings {
    pub event: Event,
    temperature_c: AtomicI32,
    lux: AtomicI32,
}

impl SensorReadings {
    pub const fn new(producer: ModuleId) -> Self {
        Self {
            event: Event::new(events::SENSOR_DATA, producer),
            temperature_c: AtomicI32::new(0),
            lux: AtomicI32::new(0),
        }
    }

    pub fn temperature_c(&self) -> i32 {
        self.temperature_c.load(Ordering::SeqCst)
    }

    pub fn lux(&self) -> i32 {
        self.lux.load(Ordering::SeqCst)
    }

    fn store(&self, temperature_c: i32, lux: i32) {
        self.temperature_c.store(temperature_c, Ordering::SeqCst);
        self.lux.store(lux, Ordering::SeqCst);
    }
}

/// Publishes a reading per tick. `publish` runs on the main thread, outside
/// the module's owning task, so it uses the claim protocol: claim, mutate,
/// send. The claim is released when the event returns idle, which makes a
/// still-outstanding claim the signal to skip a tick.
pub struct SensorPublisher {
    readings: &'static SensorReadings,
    tick: AtomicU32,
}

impl SensorPublisher {
    pub fn new(readings: &'static SensorReadings) -> Self {
        Self {
            readings,
            tick: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, router: &Router) {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst);
        if !self.readings.event.try_claim() {
            tracing::warn!(
                target: "sensor",
                tick,
                "previous reading still in flight; skipping this tick"
            );
            return;
        }
        // Synthetic readings; a real publisher would sample hardware here.
        let temperature_c = 18 + (tick as i32 * 7) % 15;
        let lux = (tick as i32 * 31) % 50;
        self.readings.store(temperature_c, lux);
        tracing::info!(target: "sensor", tick, temperature_c, lux, "publishing sensor data");
        router.send(&self.readings.event);
    }
}

impl EventModule for SensorPublisher {
    fn name(&self) -> &'static str {
        "sensor-publisher"
    }

    fn handle(&self, _router: &Router, event: EventRef) -> EventDisposition {
        if event.event_type() == events::SENSOR_DATA {
            tracing::debug!(
                target: "sensor",
                "reading returned after delivery to all subscribers"
            );
            EventDisposition::Handled
        } else {
            tracing::warn!(
                target: "sensor",
                event_type = event.event_type().raw(),
                "unexpected event"
            );
            EventDisposition::Unexpected
        }
    }
}
