//! Output fan-out router
//!
//! The routing table is derived, not configured: at startup the router asks
//! every output adapter which kinds it handles and builds kind -> queues from
//! the answers. After that the table is frozen. An event whose kind has two
//! subscribers is delivered to both; delivery into one full queue never
//! blocks or fails delivery to the others.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::OutputAdapter;
use crate::events::{Event, EventKind, EventQueue};

/// One delivery target for a kind
#[derive(Clone)]
struct Destination {
    adapter: String,
    queue: Arc<EventQueue>,
}

/// Immutable kind -> destinations table built from adapter declarations
pub struct EventRouter {
    routes: HashMap<EventKind, Vec<Destination>>,
}

impl EventRouter {
    /// Build the table from the handled-kind declarations of `adapters`.
    ///
    /// Logged at info per route so a misdeclared adapter is visible at
    /// startup rather than as silently dropped events later.
    #[must_use]
    pub fn from_adapters(adapters: &[Box<dyn OutputAdapter>]) -> Self {
        let mut routes: HashMap<EventKind, Vec<Destination>> = HashMap::new();

        for adapter in adapters {
            for &kind in adapter.handled_kinds() {
                if kind.is_input() {
                    tracing::warn!(
                        adapter = adapter.name(),
                        kind = %kind,
                        "adapter declared an input kind, ignoring"
                    );
                    continue;
                }
                tracing::info!(kind = %kind, adapter = adapter.name(), "route registered");
                routes.entry(kind).or_default().push(Destination {
                    adapter: adapter.name().to_string(),
                    queue: adapter.queue(),
                });
            }
        }

        Self { routes }
    }

    /// Deliver one output event to every subscriber of its kind.
    ///
    /// Returns the number of queues the event landed in. Input-kind events
    /// are refused, unrouted kinds are dropped with a log line, and a full
    /// destination queue costs only that destination its copy.
    pub fn route(&self, event: Event) -> usize {
        if event.kind.is_input() {
            tracing::error!(kind = %event.kind, "input event sent to the output router, dropping");
            return 0;
        }

        let Some(destinations) = self.routes.get(&event.kind) else {
            tracing::debug!(kind = %event.kind, "no subscriber for kind, dropping");
            return 0;
        };

        let mut delivered = 0;
        for dest in destinations {
            match dest.queue.push(event.clone()) {
                Ok(()) => delivered += 1,
                Err(full) => {
                    tracing::error!(
                        adapter = %dest.adapter,
                        kind = %full.kind,
                        capacity = full.capacity,
                        "destination queue full, dropping copy"
                    );
                }
            }
        }
        delivered
    }

    /// Route a batch in order; returns total deliveries
    pub fn route_all(&self, events: Vec<Event>) -> usize {
        events.into_iter().map(|e| self.route(e)).sum()
    }

    /// Number of subscribers registered for `kind`
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.routes.get(&kind).map_or(0, Vec::len)
    }
}
