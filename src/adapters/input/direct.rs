//! Direct output script adapter
//!
//! Replays a configured sequence of output events through the bypass,
//! wrapping each step in a `direct_output` input event. Used to exercise
//! output adapters (LED patterns, canned speech) without the chat model.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::Result;
use crate::adapters::{InputAdapter, Worker};
use crate::events::{Event, EventKind, EventQueue, Payload};

pub struct DirectInput {
    name: String,
    queue: Arc<EventQueue>,
    steps: Vec<Event>,
    interval: Duration,
    looping: bool,
    worker: Option<Worker>,
}

impl DirectInput {
    /// `steps` are the output events to deliver, in order
    #[must_use]
    pub fn new(
        name: &str,
        queue: Arc<EventQueue>,
        steps: Vec<Event>,
        interval: Duration,
        looping: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            queue,
            steps,
            interval,
            looping,
            worker: None,
        }
    }
}

impl InputAdapter for DirectInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn emitted_kinds(&self) -> &'static [EventKind] {
        &[EventKind::DirectOutput]
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let queue = Arc::clone(&self.queue);
        let source = self.name.clone();
        let steps = self.steps.clone();
        let interval = self.interval;
        let looping = self.looping;
        self.worker = Some(Worker::spawn(&self.name, move |stop| {
            loop {
                for step in &steps {
                    if stop.load(Ordering::Acquire) {
                        return;
                    }
                    super::push_or_drop(
                        &queue,
                        Event::input(
                            EventKind::DirectOutput,
                            Payload::Wrapped(Box::new(step.clone())),
                            &source,
                        ),
                    );
                    std::thread::sleep(interval);
                }
                if !looping || steps.is_empty() {
                    tracing::debug!("direct script finished");
                    return;
                }
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
    fn script_steps_arrive_wrapped_in_order() {
        let queue = Arc::new(EventQueue::bounded("input", 32));
        let steps = vec![
            Event::output(EventKind::LedOn, Payload::Empty),
            Event::output(EventKind::LedOff, Payload::Empty),
        ];
        let mut direct = DirectInput::new(
            "direct",
            Arc::clone(&queue),
            steps,
            Duration::from_millis(1),
            false,
        );
        direct.start().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while queue.len() < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        direct.stop();

        let first = queue.try_pop().unwrap();
        assert_eq!(first.kind, EventKind::DirectOutput);
        let Payload::Wrapped(inner) = first.payload else {
            panic!("expected wrapped payload");
        };
        assert_eq!(inner.kind, EventKind::LedOn);

        let Payload::Wrapped(inner) = queue.try_pop().unwrap().payload else {
            panic!("expected wrapped payload");
        };
        assert_eq!(inner.kind, EventKind::LedOff);
    }
}
