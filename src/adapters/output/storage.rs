//! Storage output adapter
//!
//! Persists history rows, memory notes, and distillation requests. The
//! SQLite connection lives on the worker thread; a storage failure costs
//! one row, never the event loop.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::adapters::{OutputAdapter, Worker};
use crate::db::MemoryStore;
use crate::events::{Event, EventKind, EventQueue, Payload};
use crate::{Error, Result};

const POLL: Duration = Duration::from_millis(200);

pub struct StorageOutput {
    name: String,
    queue: Arc<EventQueue>,
    store: Option<MemoryStore>,
    worker: Option<Worker>,
}

impl StorageOutput {
    #[must_use]
    pub fn new(name: &str, capacity: usize, store: MemoryStore) -> Self {
        Self {
            name: name.to_string(),
            queue: Arc::new(EventQueue::bounded(name, capacity)),
            store: Some(store),
            worker: None,
        }
    }

    fn apply(store: &mut MemoryStore, event: &Event) {
        let result = match event.kind {
            EventKind::SaveHistory => Self::save_history(store, &event.payload),
            EventKind::SaveMemory => Self::save_memory(store, &event.payload),
            EventKind::DistillMemory => store.distill().map(|_| ()),
            _ => {
                tracing::warn!(kind = %event.kind, "storage adapter got an unexpected kind");
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::error!(kind = %event.kind, error = %e, "storage write failed");
        }
    }

    fn save_history(store: &MemoryStore, payload: &Payload) -> Result<()> {
        let Payload::Record(record) = payload else {
            return Err(Error::Adapter("save_history without record payload".to_string()));
        };
        let role = record.get("role").and_then(|v| v.as_str()).unwrap_or("user");
        let text = record
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Adapter("save_history record missing text".to_string()))?;
        let source = record.get("source").and_then(|v| v.as_str());
        store.append_history(role, text, source)?;
        Ok(())
    }

    fn save_memory(store: &MemoryStore, payload: &Payload) -> Result<()> {
        let Payload::Record(record) = payload else {
            return Err(Error::Adapter("save_memory without record payload".to_string()));
        };
        let category = record.get("category").and_then(|v| v.as_str()).unwrap_or("general");
        let content = record
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Adapter("save_memory record missing content".to_string()))?;
        store.append_memory(category, content)?;
        Ok(())
    }
}

impl OutputAdapter for StorageOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn handled_kinds(&self) -> &'static [EventKind] {
        &[EventKind::SaveHistory, EventKind::SaveMemory, EventKind::DistillMemory]
    }

    fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(mut store) = self.store.take() else {
            return Err(Error::Adapter(format!("{}: store already consumed", self.name)));
        };

        let queue = Arc::clone(&self.queue);
        self.worker = Some(Worker::spawn(&self.name, move |stop| {
            loop {
                if let Some(event) = queue.pop_timeout(POLL) {
                    Self::apply(&mut store, &event);
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
