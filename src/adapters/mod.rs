//! Adapter traits and worker plumbing
//!
//! Input adapters own a source (microphone, stdin, named pipe, sensors) and
//! push events into the shared input queue from their own OS thread. Output
//! adapters own a sink (speaker, LEDs, console, storage) and drain a private
//! queue the router fans out into. Adapters declare the event kinds they
//! emit or handle; routing is derived from those declarations, never
//! hand-wired per adapter.

pub mod factory;
pub mod input;
pub mod output;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::Result;
use crate::events::{EventKind, EventQueue};

/// A source of input events.
///
/// `start` spawns the adapter's worker thread; `stop` asks it to wind down.
/// Both are idempotent.
pub trait InputAdapter: Send {
    /// Stable adapter name, used in logs and routing diagnostics
    fn name(&self) -> &str;

    /// Input kinds this adapter can emit
    fn emitted_kinds(&self) -> &'static [EventKind];

    /// Begin producing events into the input queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source cannot be opened. A failed
    /// start leaves the adapter stopped.
    fn start(&mut self) -> Result<()>;

    /// Stop producing and release the source
    fn stop(&mut self);
}

/// A sink for output events.
///
/// Each output adapter owns a bounded queue; the router pushes into it and
/// the adapter's worker thread drains it.
pub trait OutputAdapter: Send {
    /// Stable adapter name, used in logs and routing diagnostics
    fn name(&self) -> &str;

    /// Output kinds this adapter consumes
    fn handled_kinds(&self) -> &'static [EventKind];

    /// The adapter's private delivery queue
    fn queue(&self) -> Arc<EventQueue>;

    /// Begin draining the delivery queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying sink cannot be opened. A failed
    /// start leaves the adapter stopped.
    fn start(&mut self) -> Result<()>;

    /// Drain-and-stop: finish what is already queued where feasible, then
    /// release the sink
    fn stop(&mut self);
}

/// A named worker thread with a cooperative stop flag.
///
/// Adapters poll the flag between blocking operations with short timeouts so
/// `stop` converges without cancellation.
pub(crate) struct Worker {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker; the closure receives the stop flag and should return
    /// once it observes the flag set.
    pub(crate) fn spawn<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread_name = name.to_string();
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                tracing::debug!(worker = %thread_name, "worker started");
                body(flag.as_ref());
                tracing::debug!(worker = %thread_name, "worker exited");
            })
            .ok();

        if handle.is_none() {
            tracing::error!(worker = name, "failed to spawn worker thread");
        }

        Self {
            name: name.to_string(),
            stop,
            handle,
        }
    }

    /// Set the stop flag without joining. For adapters that must signal the
    /// worker before unblocking it, then join separately.
    pub(crate) fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Signal the worker to stop and wait for it to exit
    pub(crate) fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!(worker = %self.name, "worker panicked");
        }
    }

    /// Signal the worker to stop without joining.
    ///
    /// For workers blocked on reads that cannot be interrupted (stdin); the
    /// thread exits on its own once the read returns.
    pub(crate) fn stop_detached(&mut self) {
        self.stop.store(true, Ordering::Release);
        drop(self.handle.take());
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}
