//! Keyboard input adapter
//!
//! Reads stdin lines as typed utterances. A quit word becomes a critical
//! shutdown event. The reader thread blocks in `read_line`, so `stop` only
//! flags it and detaches; the thread exits after the next line or EOF.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::Result;
use crate::adapters::{InputAdapter, Worker};
use crate::events::{Event, EventKind, EventPriority, EventQueue, Payload};

const QUIT_WORDS: &[&str] = &["quit", "exit", "goodbye"];

pub struct KeyboardInput {
    name: String,
    queue: Arc<EventQueue>,
    worker: Option<Worker>,
}

impl KeyboardInput {
    #[must_use]
    pub fn new(name: &str, queue: Arc<EventQueue>) -> Self {
        Self {
            name: name.to_string(),
            queue,
            worker: None,
        }
    }

    /// Map one typed line to an event, if it warrants one
    pub(crate) fn parse_line(line: &str, source: &str) -> Option<Event> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        if QUIT_WORDS.contains(&trimmed.to_lowercase().as_str()) {
            return Some(
                Event::input(EventKind::Shutdown, Payload::Empty, source)
                    .with_priority(EventPriority::Critical),
            );
        }

        Some(
            Event::input(EventKind::UserSpeech, Payload::Text(trimmed.to_string()), source)
                .with_priority(EventPriority::High),
        )
    }
}

impl InputAdapter for KeyboardInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn emitted_kinds(&self) -> &'static [EventKind] {
        &[EventKind::UserSpeech, EventKind::Shutdown]
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let queue = Arc::clone(&self.queue);
        let source = self.name.clone();
        self.worker = Some(Worker::spawn(&self.name, move |stop| {
            let stdin = std::io::stdin();
            let mut lines = stdin.lock().lines();
            while !stop.load(Ordering::Acquire) {
                match lines.next() {
                    Some(Ok(line)) => {
                        if let Some(event) = Self::parse_line(&line, &source) {
                            super::push_or_drop(&queue, event);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "stdin read failed");
                        break;
                    }
                    None => {
                        tracing::debug!("stdin closed");
                        break;
                    }
                }
            }
        }));

        Ok(())
    }

    fn stop(&mut self) {
        // read_line cannot be interrupted; flag and detach
        if let Some(mut worker) = self.worker.take() {
            worker.stop_detached();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_line_becomes_high_priority_speech() {
        let event = KeyboardInput::parse_line("  hello there \n", "keyboard").unwrap();
        assert_eq!(event.kind, EventKind::UserSpeech);
        assert_eq!(event.priority, EventPriority::High);
        assert_eq!(event.payload.as_text(), Some("hello there"));
        assert_eq!(event.source.as_deref(), Some("keyboard"));
    }

    #[test]
    fn quit_word_becomes_critical_shutdown() {
        let event = KeyboardInput::parse_line("Quit", "keyboard").unwrap();
        assert_eq!(event.kind, EventKind::Shutdown);
        assert_eq!(event.priority, EventPriority::Critical);
    }

    #[test]
    fn blank_line_is_ignored() {
        assert!(KeyboardInput::parse_line("   ", "keyboard").is_none());
    }
}
