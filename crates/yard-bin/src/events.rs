//! The demo's event-type table. Routable values form a contiguous range
//! starting at `FIRST_EVENT_TYPE`; keep `NUM_EVENT_TYPES` in sync when adding
//! entries.

use core_router::EventType;

pub const FIRST_EVENT_TYPE: i32 = 0;
pub const NUM_EVENT_TYPES: usize = 1;

/// A fresh sensor reading is available in `SensorReadings`.
pub const SENSOR_DATA: EventType = EventType::new(0);
