//! Switchyard entrypoint: sensor readings routed across two tasks.
//!
//! Layout mirrors a small embedded bring-up: a high-priority *sensor* task
//! owns the sensor data publisher; an *app* task owns the data logger and the
//! data uploader. Both subscribe to sensor-data events. The main thread acts
//! as the polling timer, publishing a fresh reading each tick; each reading
//! fans out to the app task and comes back to the publisher once everyone is
//! done with it.

mod config;
mod data_logger;
mod data_uploader;
mod events;
mod sensor;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use clap::Parser;
use core_router::{EventModule, ModuleId, Router, RouterOptions, TaskConfig, TaskHandle};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use crate::data_logger::DataLogger;
use crate::data_uploader::DataUploader;
use crate::sensor::{SensorPublisher, SensorReadings};

// Module ids follow the task-ordered module list built in `main`.
const SENSOR_PUBLISHER: ModuleId = ModuleId::new(0);
const DATA_LOGGER: ModuleId = ModuleId::new(1);
const DATA_UPLOADER: ModuleId = ModuleId::new(2);

static READINGS: SensorReadings = SensorReadings::new(SENSOR_PUBLISHER);

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(
    name = "switchyard",
    version,
    about = "Event-routing demo: sensor readings fan out to a logger and an uploader"
)]
struct Args {
    /// Optional configuration file path (overrides discovery of `switchyard.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Override the number of publish ticks before exiting.
    #[arg(long)]
    ticks: Option<u32>,
}

struct DriverTask {
    name: &'static str,
    handle: TaskHandle,
    router_tx: mpsc::Sender<Arc<Router>>,
    join: thread::JoinHandle<()>,
}

/// Spawns a task's driver loop. The thread reports its `TaskHandle` first
/// (the router needs it at construction), then waits for the router and
/// drains its queue until `stop` is raised and the queue runs dry.
fn spawn_driver(name: &'static str, stop: Arc<AtomicBool>) -> Result<DriverTask> {
    let (handle_tx, handle_rx) = mpsc::channel();
    let (router_tx, router_rx) = mpsc::channel::<Arc<Router>>();
    let join = thread::Builder::new().name(name.to_string()).spawn(move || {
        if handle_tx.send(TaskHandle::current()).is_err() {
            return;
        }
        let Ok(router) = router_rx.recv() else {
            return;
        };
        info!(target: "runtime", task = name, "driver loop started");
        loop {
            if let Some(event) = router.timed_receive(Duration::from_millis(100)) {
                router.call_handlers(event);
            } else if stop.load(Ordering::SeqCst) {
                break;
            }
        }
        info!(target: "runtime", task = name, "driver loop stopped");
    })?;
    let handle = handle_rx.recv()?;
    Ok(DriverTask {
        name,
        handle,
        router_tx,
        join,
    })
}

fn configure_logging() -> Result<Option<WorkerGuard>> {
    let file_appender = tracing_appender::rolling::never(".", "switchyard.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(()) => Ok(Some(guard)),
        // A subscriber is already installed; drop the guard so the writer
        // shuts down.
        Err(_) => Ok(None),
    }
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(target: "runtime.panic", %info, "panic");
        previous(info);
    }));
}

fn main() -> Result<()> {
    let log_guard = configure_logging()?;
    install_panic_hook();
    info!(target: "runtime", "startup");

    let args = Args::parse();
    let mut config = config::load_from(args.config.as_deref())?;
    if let Some(ticks) = args.ticks {
        config.publish.ticks = ticks;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let sensor_task = spawn_driver("sensor", Arc::clone(&stop))?;
    let app_task = spawn_driver("app", Arc::clone(&stop))?;

    let publisher = Arc::new(SensorPublisher::new(&READINGS));
    let logger = Arc::new(DataLogger::new(&READINGS));
    let uploader = Arc::new(DataUploader::new(&READINGS));

    let options = RouterOptions::new(events::FIRST_EVENT_TYPE, events::NUM_EVENT_TYPES)
        .with_task(TaskConfig {
            name: "sensor",
            handle: sensor_task.handle,
            queue_capacity: config.queue.capacity,
            modules: vec![Arc::clone(&publisher) as Arc<dyn EventModule>],
        })
        .with_task(TaskConfig {
            name: "app",
            handle: app_task.handle,
            queue_capacity: config.queue.capacity,
            modules: vec![
                Arc::clone(&logger) as Arc<dyn EventModule>,
                Arc::clone(&uploader) as Arc<dyn EventModule>,
            ],
        });
    let router = Arc::new(Router::threaded(options)?);

    // Bring-up happens before the first send, so subscribing from the main
    // thread cannot race a delivery.
    router.subscribe(DATA_LOGGER, events::SENSOR_DATA);
    router.subscribe(DATA_UPLOADER, events::SENSOR_DATA);

    for task in [&sensor_task, &app_task] {
        task.router_tx
            .send(Arc::clone(&router))
            .map_err(|_| anyhow!("driver `{}` exited before receiving the router", task.name))?;
    }

    for _ in 0..config.publish.ticks {
        thread::sleep(Duration::from_millis(config.publish.period_ms));
        publisher.publish(&router);
    }

    // Let the last reading finish its round trip before tearing down.
    let deadline = Instant::now() + Duration::from_secs(5);
    while READINGS.event.is_in_flight() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    stop.store(true, Ordering::SeqCst);
    for task in [sensor_task, app_task] {
        if task.join.join().is_err() {
            error!(target: "runtime", task = task.name, "driver thread panicked");
        }
    }

    info!(
        target: "runtime",
        uploaded = uploader.uploaded(),
        "all readings delivered"
    );
    match Arc::try_unwrap(router) {
        Ok(router) => router.deinit(),
        Err(_) => error!(target: "runtime", "router still shared at shutdown"),
    }

    info!(target: "runtime", "shutdown complete");
    drop(log_guard);
    Ok(())
}
