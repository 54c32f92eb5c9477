//! LED output adapter
//!
//! Drives a status LED through the [`LedDriver`] seam. The sysfs driver
//! covers real boards; the mock driver backs tests and headless runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::adapters::{OutputAdapter, Worker};
use crate::events::{Event, EventKind, EventQueue, Payload};
use crate::{Error, Result};

const POLL: Duration = Duration::from_millis(200);
const DEFAULT_BLINK_REPEATS: u64 = 3;
const DEFAULT_BLINK_INTERVAL_MS: u64 = 200;
// Blink parameters arrive unvalidated over the pipe; bound them so one
// event cannot pin the worker past the shutdown budget
const MAX_BLINK_REPEATS: u64 = 50;
const MAX_BLINK_INTERVAL_MS: u64 = 2_000;

/// Hardware seam for a single LED
pub trait LedDriver: Send {
    /// Set the LED on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware write fails.
    fn set(&mut self, on: bool) -> Result<()>;
}

/// Linux sysfs LED, e.g. `/sys/class/leds/led0/brightness`
pub struct SysfsLedDriver {
    brightness_path: PathBuf,
}

impl SysfsLedDriver {
    #[must_use]
    pub const fn new(brightness_path: PathBuf) -> Self {
        Self { brightness_path }
    }
}

impl LedDriver for SysfsLedDriver {
    fn set(&mut self, on: bool) -> Result<()> {
        std::fs::write(&self.brightness_path, if on { "1" } else { "0" }).map_err(|e| {
            Error::Adapter(format!(
                "led write to {} failed: {e}",
                self.brightness_path.display()
            ))
        })
    }
}

/// In-memory LED for tests; the shared flag mirrors the last state set
#[derive(Clone, Default)]
pub struct MockLedDriver {
    state: Arc<AtomicBool>,
}

impl MockLedDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to observe the LED state from the test thread
    #[must_use]
    pub fn state(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.state)
    }
}

impl LedDriver for MockLedDriver {
    fn set(&mut self, on: bool) -> Result<()> {
        self.state.store(on, Ordering::Release);
        Ok(())
    }
}

pub struct LedOutput {
    name: String,
    queue: Arc<EventQueue>,
    driver: Option<Box<dyn LedDriver>>,
    worker: Option<Worker>,
}

impl LedOutput {
    #[must_use]
    pub fn new(name: &str, capacity: usize, driver: Box<dyn LedDriver>) -> Self {
        Self {
            name: name.to_string(),
            queue: Arc::new(EventQueue::bounded(name, capacity)),
            driver: Some(driver),
            worker: None,
        }
    }

    fn apply(driver: &mut dyn LedDriver, event: &Event, stop: &AtomicBool) {
        let result = match event.kind {
            EventKind::LedOn => driver.set(true),
            EventKind::LedOff => driver.set(false),
            EventKind::LedBlink => Self::blink(driver, &event.payload, stop),
            _ => {
                tracing::warn!(kind = %event.kind, "led adapter got an unexpected kind");
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "led update failed");
        }
    }

    fn blink(driver: &mut dyn LedDriver, payload: &Payload, stop: &AtomicBool) -> Result<()> {
        let (repeats, interval_ms) = if let Payload::Record(record) = payload {
            (
                record
                    .get("repeats")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(DEFAULT_BLINK_REPEATS),
                record
                    .get("interval_ms")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(DEFAULT_BLINK_INTERVAL_MS),
            )
        } else {
            (DEFAULT_BLINK_REPEATS, DEFAULT_BLINK_INTERVAL_MS)
        };
        let repeats = repeats.min(MAX_BLINK_REPEATS);
        let interval = Duration::from_millis(interval_ms.min(MAX_BLINK_INTERVAL_MS));

        for _ in 0..repeats {
            if stop.load(Ordering::Acquire) {
                break;
            }
            driver.set(true)?;
            std::thread::sleep(interval);
            driver.set(false)?;
            if stop.load(Ordering::Acquire) {
                break;
            }
            std::thread::sleep(interval);
        }
        Ok(())
    }
}

impl OutputAdapter for LedOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn handled_kinds(&self) -> &'static [EventKind] {
        &[EventKind::LedOn, EventKind::LedOff, EventKind::LedBlink]
    }

    fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(mut driver) = self.driver.take() else {
            return Err(Error::Adapter(format!("{}: driver already consumed", self.name)));
        };

        let queue = Arc::clone(&self.queue);
        self.worker = Some(Worker::spawn(&self.name, move |stop| {
            loop {
                if let Some(event) = queue.pop_timeout(POLL) {
                    Self::apply(driver.as_mut(), &event, stop);
                } else if stop.load(Ordering::Acquire) {
                    break;
                }
            }
            // Leave the LED dark on the way out
            if let Err(e) = driver.set(false) {
                tracing::warn!(error = %e, "could not turn led off on stop");
            }
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop_and_join();
        }
    }
}
