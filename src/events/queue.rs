//! Thread-safe priority event queue
//!
//! A binary heap keyed by `(priority, sequence)` behind a mutex, so events of
//! equal priority pop in arrival order regardless of producer thread. Many
//! producers, one consumer per queue; the same type backs the shared input
//! queue and every output adapter's private queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use thiserror::Error;

use super::{Event, EventKind, EventPriority};

/// A bounded queue rejected a push. Carries the dropped event so the caller
/// can log it or retry.
#[derive(Debug, Error)]
#[error("queue '{queue}' full ({capacity}), dropped {kind}")]
pub struct QueueFull {
    /// Queue name
    pub queue: String,
    /// Configured capacity
    pub capacity: usize,
    /// Kind of the rejected event
    pub kind: EventKind,
    /// The rejected event itself
    pub dropped: Event,
}

/// Heap entry: priority first, then arrival sequence for a stable tie-break.
struct Entry {
    event: Event,
    seq: u64,
}

impl Entry {
    fn key(&self) -> (u8, u64) {
        (self.event.priority.rank(), self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the smallest key pops first
        other.key().cmp(&self.key())
    }
}

struct Inner {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

/// Priority queue for events
pub struct EventQueue {
    name: String,
    capacity: Option<usize>,
    inner: Mutex<Inner>,
    not_empty: Condvar,
}

impl EventQueue {
    /// Create a bounded queue. Pushes beyond `capacity` return [`QueueFull`],
    /// except for critical-priority events, which are always admitted.
    #[must_use]
    pub fn bounded(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            capacity: Some(capacity),
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Create an unbounded queue
    #[must_use]
    pub fn unbounded(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capacity: None,
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Queue name (for diagnostics)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert an event.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] carrying the event back when a bounded queue is
    /// at capacity. Critical-priority events are exempt from the capacity
    /// check; a shutdown must stay enqueueable under backlog. Never blocks.
    pub fn push(&self, event: Event) -> Result<(), QueueFull> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(capacity) = self.capacity
            && inner.heap.len() >= capacity
            && event.priority != EventPriority::Critical
        {
            return Err(QueueFull {
                queue: self.name.clone(),
                capacity,
                kind: event.kind,
                dropped: event,
            });
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Entry { event, seq });
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the highest-priority, earliest-arrival event, waiting up to
    /// `timeout` if the queue is empty.
    ///
    /// `None` on timeout is not an error; worker loops rely on it to stay
    /// responsive to shutdown.
    #[must_use]
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Event> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let deadline = std::time::Instant::now() + timeout;

        loop {
            if let Some(entry) = inner.heap.pop() {
                return Some(entry.event);
            }
            let remaining = deadline.checked_duration_since(std::time::Instant::now())?;
            let (guard, result) = self
                .not_empty
                .wait_timeout(inner, remaining)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            inner = guard;
            if result.timed_out() && inner.heap.is_empty() {
                return None;
            }
        }
    }

    /// Remove the highest-priority event without waiting
    #[must_use]
    pub fn try_pop(&self) -> Option<Event> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.heap.pop().map(|entry| entry.event)
    }

    /// Number of queued events
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .heap
            .len()
    }

    /// True when nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::events::{EventPriority, Payload};

    fn text_input(text: &str, priority: EventPriority) -> Event {
        Event::input(EventKind::UserSpeech, Payload::Text(text.to_string()), "test")
            .with_priority(priority)
    }

    #[test]
    fn pops_by_priority_then_arrival() {
        let queue = EventQueue::unbounded("test");
        queue.push(text_input("shutdown", EventPriority::Critical)).unwrap();
        queue.push(text_input("x", EventPriority::Normal)).unwrap();
        queue.push(text_input("y", EventPriority::High)).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| queue.try_pop())
            .map(|e| e.payload.as_text().unwrap().to_string())
            .collect();
        assert_eq!(order, ["shutdown", "y", "x"]);
    }

    #[test]
    fn equal_priority_preserves_insertion_order() {
        let queue = EventQueue::unbounded("test");
        for i in 0..20 {
            queue.push(text_input(&format!("e{i}"), EventPriority::Normal)).unwrap();
        }
        for i in 0..20 {
            let event = queue.try_pop().unwrap();
            assert_eq!(event.payload.as_text().unwrap(), format!("e{i}"));
        }
    }

    #[test]
    fn bounded_queue_signals_full() {
        let queue = EventQueue::bounded("small", 2);
        queue.push(text_input("a", EventPriority::Normal)).unwrap();
        queue.push(text_input("b", EventPriority::Normal)).unwrap();

        let err = queue.push(text_input("c", EventPriority::Normal)).unwrap_err();
        assert_eq!(err.capacity, 2);
        assert_eq!(err.kind, EventKind::UserSpeech);
        assert_eq!(err.dropped.payload.as_text(), Some("c"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn full_queue_still_admits_critical_events() {
        let queue = EventQueue::bounded("small", 2);
        queue.push(text_input("a", EventPriority::Normal)).unwrap();
        queue.push(text_input("b", EventPriority::Normal)).unwrap();
        assert!(queue.push(text_input("c", EventPriority::Normal)).is_err());

        // A backlog must never be able to swallow a shutdown
        queue
            .push(
                Event::input(EventKind::Shutdown, Payload::Empty, "signal")
                    .with_priority(EventPriority::Critical),
            )
            .unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop().unwrap().kind, EventKind::Shutdown);
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let queue = EventQueue::unbounded("test");
        let start = std::time::Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn pop_wakes_on_push_from_other_thread() {
        let queue = Arc::new(EventQueue::unbounded("test"));
        let producer = Arc::clone(&queue);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            producer.push(text_input("late", EventPriority::Normal)).unwrap();
        });

        let event = queue.pop_timeout(Duration::from_secs(2)).expect("event");
        assert_eq!(event.payload.as_text(), Some("late"));
        handle.join().unwrap();
    }

    #[test]
    fn concurrent_producers_keep_per_thread_order_and_priority_bands() {
        let queue = Arc::new(EventQueue::unbounded("test"));
        let mut handles = Vec::new();

        for producer in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let priority = if i % 10 == 0 {
                        EventPriority::High
                    } else {
                        EventPriority::Normal
                    };
                    queue
                        .push(text_input(&format!("p{producer}-{i}"), priority))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut last_rank = 0u8;
        let mut per_producer: Vec<Vec<usize>> = vec![Vec::new(); 4];
        while let Some(event) = queue.try_pop() {
            assert!(event.priority.rank() >= last_rank, "priority went backwards");
            last_rank = event.priority.rank();

            // Within a band, each producer's own events keep program order
            if event.priority == EventPriority::Normal {
                let text = event.payload.as_text().unwrap();
                let (p, i) = text[1..].split_once('-').unwrap();
                per_producer[p.parse::<usize>().unwrap()].push(i.parse().unwrap());
            }
        }
        for seen in per_producer {
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "per-producer order broken");
        }
    }
}
