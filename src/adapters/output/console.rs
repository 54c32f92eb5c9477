//! Console output adapter
//!
//! Prints spoken replies to stdout. Subscribes to the same kind as the
//! speech adapter, so every utterance is both audible and readable.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::Result;
use crate::adapters::{OutputAdapter, Worker};
use crate::events::{EventKind, EventQueue};

const POLL: Duration = Duration::from_millis(200);

pub struct ConsoleOutput {
    name: String,
    queue: Arc<EventQueue>,
    worker: Option<Worker>,
}

impl ConsoleOutput {
    #[must_use]
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            queue: Arc::new(EventQueue::bounded(name, capacity)),
            worker: None,
        }
    }
}

impl OutputAdapter for ConsoleOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn handled_kinds(&self) -> &'static [EventKind] {
        &[EventKind::Speak]
    }

    fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let queue = Arc::clone(&self.queue);
        self.worker = Some(Worker::spawn(&self.name, move |stop| {
            loop {
                if let Some(event) = queue.pop_timeout(POLL) {
                    if let Some(text) = event.payload.as_text() {
                        println!("Buddy: {text}");
                    }
                } else if stop.load(Ordering::Acquire) {
                    break;
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
