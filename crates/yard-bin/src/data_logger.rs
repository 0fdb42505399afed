//! Logs every sensor reading it receives.

use core_router::{EventDisposition, EventModule, EventRef, Router};

use crate::events;
use crate::sensor::SensorReadings;

pub struct DataLogger {
    readings: &'static SensorReadings,
}

impl DataLogger {
    pub fn new(readings: &'static SensorReadings) -> Self {
        Self { readings }
    }
}

impl EventModule for DataLogger {
    fn name(&self) -> &'static str {
        "data-logger"
    }

    fn handle(&self, _router: &Router, event: EventRef) -> EventDisposition {
        if event.event_type() == events::SENSOR_DATA {
            tracing::info!(
                target: "app.logger",
                temperature_c = self.readings.temperature_c(),
                lux = self.readings.lux(),
                "logging sensor data"
            );
            EventDisposition::Handled
        } else {
            tracing::warn!(
                target: "app.logger",
                event_type = event.event_type().raw(),
                "unexpected event"
            );
            EventDisposition::Unexpected
        }
    }
}
