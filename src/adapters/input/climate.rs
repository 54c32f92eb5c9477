//! Climate input adapter
//!
//! Polls a temperature/humidity sensor on an interval and emits one reading
//! pair per poll. Unlike the radar this is level-based; the brain decides
//! what changes matter.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::Result;
use crate::adapters::{InputAdapter, Worker};
use crate::events::{Event, EventKind, EventQueue, Payload};

/// One climate observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
}

/// Hardware seam for a climate sensor (DHT11 on the reference hardware)
pub trait ClimateSensor: Send {
    /// Take one reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the sensor read fails; the adapter skips the
    /// cycle. DHT-class sensors fail a read now and then, so this is routine.
    fn read(&mut self) -> Result<ClimateReading>;
}

/// Replays a fixed reading sequence, then holds the last value
pub struct ScriptedClimateSensor {
    readings: Vec<ClimateReading>,
    index: usize,
}

impl ScriptedClimateSensor {
    #[must_use]
    pub const fn new(readings: Vec<ClimateReading>) -> Self {
        Self { readings, index: 0 }
    }
}

impl ClimateSensor for ScriptedClimateSensor {
    fn read(&mut self) -> Result<ClimateReading> {
        let reading = self
            .readings
            .get(self.index)
            .or_else(|| self.readings.last())
            .copied()
            .ok_or_else(|| crate::Error::Sensor("script exhausted".to_string()))?;
        if self.index < self.readings.len() {
            self.index += 1;
        }
        Ok(reading)
    }
}

pub struct ClimateInput {
    name: String,
    queue: Arc<EventQueue>,
    sensor: Option<Box<dyn ClimateSensor>>,
    poll_interval: Duration,
    worker: Option<Worker>,
}

impl ClimateInput {
    #[must_use]
    pub fn new(
        name: &str,
        queue: Arc<EventQueue>,
        sensor: Box<dyn ClimateSensor>,
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

impl InputAdapter for ClimateInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn emitted_kinds(&self) -> &'static [EventKind] {
        &[EventKind::SensorTemperature, EventKind::SensorHumidity]
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
            while !stop.load(Ordering::Acquire) {
                match sensor.read() {
                    Ok(reading) => {
                        super::push_or_drop(
                            &queue,
                            Event::input(
                                EventKind::SensorTemperature,
                                Payload::Reading(reading.temperature_c),
                                &source,
                            ),
                        );
                        super::push_or_drop(
                            &queue,
                            Event::input(
                                EventKind::SensorHumidity,
                                Payload::Reading(reading.humidity_pct),
                                &source,
                            ),
                        );
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "climate read failed, skipping cycle");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_arrive_as_temperature_and_humidity_pairs() {
        let queue = Arc::new(EventQueue::bounded("input", 32));
        let sensor = ScriptedClimateSensor::new(vec![ClimateReading {
            temperature_c: 21.5,
            humidity_pct: 40.0,
        }]);
        let mut climate = ClimateInput::new(
            "climate",
            Arc::clone(&queue),
            Box::new(sensor),
            Duration::from_millis(10),
        );
        climate.start().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while queue.len() < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        climate.stop();

        let first = queue.try_pop().unwrap();
        let second = queue.try_pop().unwrap();
        assert_eq!(first.kind, EventKind::SensorTemperature);
        assert_eq!(first.payload, Payload::Reading(21.5));
        assert_eq!(second.kind, EventKind::SensorHumidity);
        assert_eq!(second.payload, Payload::Reading(40.0));
    }
}
