//! Forwards sensor readings to the (simulated) backend service.

use std::sync::atomic::{AtomicU32, Ordering};

use core_router::{EventDisposition, EventModule, EventRef, Router};

use crate::events;
use crate::sensor::SensorReadings;

pub struct DataUploader {
    readings: &'static SensorReadings,
    uploaded: AtomicU32,
}

impl DataUploader {
    pub fn new(readings: &'static SensorReadings) -> Self {
        Self {
            readings,
            uploaded: AtomicU32::new(0),
        }
    }

    pub fn uploaded(&self) -> u32 {
        self.uploaded.load(Ordering::SeqCst)
    }
}

impl EventModule for DataUploader {
    fn name(&self) -> &'static str {
        "data-uploader"
    }

    fn handle(&self, _router: &Router, event: EventRef) -> EventDisposition {
        if event.event_type() == events::SENSOR_DATA {
            let total = self.uploaded.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!(
                target: "app.uploader",
                temperature_c = self.readings.temperature_c(),
                lux = self.readings.lux(),
                total,
                "uploading sensor data"
            );
            EventDisposition::Handled
        } else {
            tracing::warn!(
                target: "app.uploader",
                event_type = event.event_type().raw(),
                "unexpected event"
            );
            EventDisposition::Unexpected
        }
    }
}
