//! Named pipe input adapter (unix only)
//!
//! Creates a FIFO and turns each written line into an event. Plain text
//! becomes a pipe command; a JSON object selects the kind explicitly, and an
//! output kind is wrapped for the direct-output bypass. The reader blocks in
//! `open`/`read`, so `stop` unblocks it by writing a newline into the FIFO.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde::Deserialize;

use crate::adapters::{InputAdapter, Worker};
use crate::events::{Event, EventKind, EventPriority, EventQueue, Payload};
use crate::{Error, Result};

#[derive(Deserialize)]
struct PipeMessage {
    kind: EventKind,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    priority: Option<EventPriority>,
}

pub struct PipeInput {
    name: String,
    path: PathBuf,
    queue: Arc<EventQueue>,
    worker: Option<Worker>,
}

impl PipeInput {
    #[must_use]
    pub fn new(name: &str, path: PathBuf, queue: Arc<EventQueue>) -> Self {
        Self {
            name: name.to_string(),
            path,
            queue,
            worker: None,
        }
    }

    /// Create the FIFO if it does not already exist
    fn ensure_fifo(path: &std::path::Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }

        let cpath = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| Error::Adapter("pipe path contains a NUL byte".to_string()))?;

        // SAFETY: cpath is a valid NUL-terminated path for the duration of
        // the call; mkfifo does not retain the pointer.
        #[allow(unsafe_code)]
        let ret = unsafe { libc::mkfifo(cpath.as_ptr(), 0o600) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(Error::Adapter(format!(
                    "mkfifo {} failed: {err}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Map one FIFO line to an event, if it warrants one
    pub(crate) fn parse_line(line: &str, source: &str) -> Option<Event> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        if !trimmed.starts_with('{') {
            return Some(Event::input(
                EventKind::PipeCommand,
                Payload::Text(trimmed.to_string()),
                source,
            ));
        }

        let message: PipeMessage = match serde_json::from_str(trimmed) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable pipe message, dropping");
                return None;
            }
        };

        let payload = Payload::from_json(message.payload);
        let event = if message.kind.is_output() {
            // Output kinds ride the bypass: wrap so the brain delivers them
            // verbatim
            let mut inner = Event::output(message.kind, payload);
            if let Some(priority) = message.priority {
                inner = inner.with_priority(priority);
            }
            Event::input(EventKind::DirectOutput, Payload::Wrapped(Box::new(inner)), source)
        } else {
            let mut event = Event::input(message.kind, payload, source);
            if message.kind == EventKind::Shutdown {
                event = event.with_priority(EventPriority::Critical);
            } else if let Some(priority) = message.priority {
                event = event.with_priority(priority);
            }
            event
        };

        Some(event)
    }
}

impl InputAdapter for PipeInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn emitted_kinds(&self) -> &'static [EventKind] {
        &[
            EventKind::PipeCommand,
            EventKind::DirectOutput,
            EventKind::Shutdown,
        ]
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        Self::ensure_fifo(&self.path)?;

        let queue = Arc::clone(&self.queue);
        let source = self.name.clone();
        let path = self.path.clone();
        self.worker = Some(Worker::spawn(&self.name, move |stop| {
            while !stop.load(Ordering::Acquire) {
                // Blocks until a writer connects
                let file = match std::fs::File::open(&path) {
                    Ok(file) => file,
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "fifo open failed");
                        break;
                    }
                };

                for line in BufReader::new(file).lines() {
                    if stop.load(Ordering::Acquire) {
                        return;
                    }
                    match line {
                        Ok(line) => {
                            if let Some(event) = Self::parse_line(&line, &source) {
                                super::push_or_drop(&queue, event);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "fifo read failed");
                            break;
                        }
                    }
                }
                // Writer closed; loop around and reopen
            }
        }));

        tracing::info!(path = %self.path.display(), "pipe input listening");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            // Flag first, then nudge: the reader must observe the flag as
            // soon as the newline unblocks it
            worker.signal_stop();
            // The non-blocking write open fails with ENXIO when no reader
            // holds the FIFO (the worker already exited); a plain open would
            // block forever in that case
            match std::fs::OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&self.path)
            {
                Ok(mut fifo) => {
                    if let Err(e) = fifo.write_all(b"\n") {
                        tracing::warn!(error = %e, "could not nudge fifo reader");
                    }
                    worker.stop_and_join();
                }
                Err(e) => {
                    tracing::debug!(error = %e, "no fifo reader to nudge, detaching");
                    worker.stop_detached();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_becomes_pipe_command() {
        let event = PipeInput::parse_line("what time is it\n", "pipe").unwrap();
        assert_eq!(event.kind, EventKind::PipeCommand);
        assert_eq!(event.payload.as_text(), Some("what time is it"));
    }

    #[test]
    fn json_output_kind_is_wrapped_for_bypass() {
        let event =
            PipeInput::parse_line(r#"{"kind": "led_blink", "payload": {"repeats": 2}}"#, "pipe")
                .unwrap();
        assert_eq!(event.kind, EventKind::DirectOutput);
        let Payload::Wrapped(inner) = &event.payload else {
            panic!("expected wrapped payload");
        };
        assert_eq!(inner.kind, EventKind::LedBlink);
    }

    #[test]
    fn json_shutdown_is_critical() {
        let event = PipeInput::parse_line(r#"{"kind": "shutdown"}"#, "pipe").unwrap();
        assert_eq!(event.kind, EventKind::Shutdown);
        assert_eq!(event.priority, EventPriority::Critical);
    }

    #[test]
    fn garbage_json_is_dropped() {
        assert!(PipeInput::parse_line("{not json", "pipe").is_none());
        assert!(PipeInput::parse_line("", "pipe").is_none());
    }

    #[test]
    fn fifo_round_trip_delivers_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buddy.pipe");
        let queue = Arc::new(EventQueue::bounded("input", 16));
        let mut pipe = PipeInput::new("pipe", path.clone(), Arc::clone(&queue));
        pipe.start().unwrap();

        {
            let mut writer = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            writeln!(writer, "hello from outside").unwrap();
        }

        let event = queue
            .pop_timeout(std::time::Duration::from_secs(2))
            .expect("event from fifo");
        assert_eq!(event.kind, EventKind::PipeCommand);
        assert_eq!(event.payload.as_text(), Some("hello from outside"));

        pipe.stop();
    }

    #[test]
    fn stop_returns_promptly_without_a_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buddy.pipe");
        PipeInput::ensure_fifo(&path).unwrap();

        let queue = Arc::new(EventQueue::bounded("input", 4));
        let mut pipe = PipeInput::new("pipe", path, queue);
        // Worker that exits immediately, as the reader does when its open
        // fails; nobody is left holding the FIFO read end
        pipe.worker = Some(Worker::spawn("pipe", |_| {}));

        let begun = std::time::Instant::now();
        pipe.stop();
        assert!(begun.elapsed() < std::time::Duration::from_secs(1));
    }
}
