//! Radar presence input adapter
//!
//! Polls a presence sensor and emits edge-triggered events: one when
//! presence flips, one when movement flips. Steady state is silent so the
//! queue is not flooded at the poll rate.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::Result;
use crate::adapters::{InputAdapter, Worker};
use crate::events::{Event, EventKind, EventQueue, Payload};

/// One radar observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSample {
    pub present: bool,
    pub moving: bool,
}

/// Hardware seam for a presence radar
pub trait PresenceSensor: Send {
    /// Take one reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the sensor read fails; the adapter logs it and
    /// keeps polling.
    fn sample(&mut self) -> Result<PresenceSample>;
}

/// Replays a fixed sample sequence, then holds the last value.
///
/// Backs tests and headless runs.
pub struct ScriptedPresenceSensor {
    samples: Vec<PresenceSample>,
    index: usize,
}

impl ScriptedPresenceSensor {
    #[must_use]
    pub const fn new(samples: Vec<PresenceSample>) -> Self {
        Self { samples, index: 0 }
    }
}

impl PresenceSensor for ScriptedPresenceSensor {
    fn sample(&mut self) -> Result<PresenceSample> {
        let sample = self
            .samples
            .get(self.index)
            .or_else(|| self.samples.last())
            .copied()
            .unwrap_or(PresenceSample {
                present: false,
                moving: false,
            });
        if self.index < self.samples.len() {
            self.index += 1;
        }
        Ok(sample)
    }
}

pub struct RadarInput {
    name: String,
    queue: Arc<EventQueue>,
    sensor: Option<Box<dyn PresenceSensor>>,
    poll_interval: Duration,
    worker: Option<Worker>,
}

impl RadarInput {
    #[must_use]
    pub fn new(
        name: &str,
        queue: Arc<EventQueue>,
        sensor: Box<dyn PresenceSensor>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            queue,
            sensor: Some(sensor),
            poll_interval,
            worker: None,
        }
    }
}

impl InputAdapter for RadarInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn emitted_kinds(&self) -> &'static [EventKind] {
        &[EventKind::SensorPresence, EventKind::SensorMovement]
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(mut sensor) = self.sensor.take() else {
            return Err(crate::Error::Adapter(format!(
                "{}: sensor already consumed",
                self.name
            )));
        };

        let queue = Arc::clone(&self.queue);
        let source = self.name.clone();
        let interval = self.poll_interval;
        self.worker = Some(Worker::spawn(&self.name, move |stop| {
            let mut last: Option<PresenceSample> = None;
            while !stop.load(Ordering::Acquire) {
                match sensor.sample() {
                    Ok(sample) => {
                        if last.is_none_or(|l| l.present != sample.present) {
                            super::push_or_drop(
                                &queue,
                                Event::input(
                                    EventKind::SensorPresence,
                                    Payload::Flag(sample.present),
                                    &source,
                                ),
                            );
                        }
                        if last.is_none_or(|l| l.moving != sample.moving) {
                            super::push_or_drop(
                                &queue,
                                Event::input(
                                    EventKind::SensorMovement,
                                    Payload::Flag(sample.moving),
                                    &source,
                                ),
                            );
                        }
                        last = Some(sample);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "radar read failed");
                    }
                }
                std::thread::sleep(interval);
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
