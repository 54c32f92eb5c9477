//! End-to-end dispatch tests: events in, routed decisions out.
//!
//! Collaborators are mocked at the trait seams (chat model, output sinks);
//! queues, brain, router, and orchestrator are the real thing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use buddy::adapters::OutputAdapter;
use buddy::audio::AudioArbiter;
use buddy::cloud::ChatModel;
use buddy::events::{Event, EventKind, EventPriority, EventQueue, Payload};
use buddy::{Brain, BrainConfig, Orchestrator, Result};

/// Chat model that replies from a script, or always fails
struct ScriptedModel {
    reply: Option<String>,
}

impl ChatModel for ScriptedModel {
    fn reply(&mut self, prompt: &str) -> Result<String> {
        self.reply
            .clone()
            .map(|r| format!("{r} (to: {prompt})"))
            .ok_or_else(|| buddy::Error::Llm("model offline".to_string()))
    }
}

/// Output adapter that records everything delivered to it
struct RecordingSink {
    name: &'static str,
    kinds: &'static [EventKind],
    queue: Arc<EventQueue>,
    seen: Arc<Mutex<Vec<Event>>>,
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl RecordingSink {
    fn new(name: &'static str, kinds: &'static [EventKind]) -> (Box<dyn OutputAdapter>, Arc<Mutex<Vec<Event>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Self {
            name,
            kinds,
            queue: Arc::new(EventQueue::bounded(name, 32)),
            seen: Arc::clone(&seen),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        };
        (Box::new(sink), seen)
    }
}

impl OutputAdapter for RecordingSink {
    fn name(&self) -> &str {
        self.name
    }

    fn handled_kinds(&self) -> &'static [EventKind] {
        self.kinds
    }

    fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    fn start(&mut self) -> Result<()> {
        let queue = Arc::clone(&self.queue);
        let seen = Arc::clone(&self.seen);
        let stop = Arc::clone(&self.stop);
        self.handle = Some(std::thread::spawn(move || {
            loop {
                if let Some(event) = queue.pop_timeout(Duration::from_millis(20)) {
                    seen.lock().unwrap().push(event);
                } else if stop.load(Ordering::Acquire) {
                    break;
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

struct Harness {
    input_queue: Arc<EventQueue>,
    handle: std::thread::JoinHandle<Result<()>>,
}

fn start(reply: Option<&str>, outputs: Vec<Box<dyn OutputAdapter>>) -> Harness {
    let input_queue = Arc::new(EventQueue::bounded("input", 64));
    let arbiter = Arc::new(AudioArbiter::new("test-device"));
    let brain = Brain::new(
        Box::new(ScriptedModel {
            reply: reply.map(ToString::to_string),
        }),
        BrainConfig::default(),
    );
    let orchestrator = Orchestrator::assemble(
        brain,
        Vec::new(),
        outputs,
        Arc::clone(&input_queue),
        arbiter,
    );
    let handle = std::thread::spawn(move || orchestrator.run());
    Harness {
        input_queue,
        handle,
    }
}

fn push(harness: &Harness, event: Event) {
    harness.input_queue.push(event).expect("input queue has room");
}

fn shutdown_and_join(harness: Harness) {
    push(
        &harness,
        Event::input(EventKind::Shutdown, Payload::Empty, "test")
            .with_priority(EventPriority::Critical),
    );
    harness.handle.join().expect("orchestrator thread").expect("clean run");
}

fn wait_for<F: Fn() -> bool>(cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn speech(text: &str) -> Event {
    Event::input(EventKind::UserSpeech, Payload::Text(text.to_string()), "voice")
        .with_priority(EventPriority::High)
}

#[test]
fn spoken_reply_fans_out_to_every_subscriber() {
    let (speech_sink, spoken) = RecordingSink::new("speech", &[EventKind::Speak]);
    let (console_sink, printed) = RecordingSink::new("console", &[EventKind::Speak]);
    let harness = start(Some("hello"), vec![speech_sink, console_sink]);

    push(&harness, speech("hi buddy"));
    wait_for(|| !spoken.lock().unwrap().is_empty() && !printed.lock().unwrap().is_empty());
    shutdown_and_join(harness);

    let spoken = spoken.lock().unwrap();
    let printed = printed.lock().unwrap();
    assert_eq!(spoken.len(), 1);
    assert_eq!(printed.len(), 1);
    // Both subscribers got the same utterance
    assert_eq!(
        spoken[0].payload.as_text(),
        printed[0].payload.as_text()
    );
    assert_eq!(spoken[0].payload.as_text(), Some("hello (to: hi buddy)"));
}

#[test]
fn history_rows_reach_the_storage_subscriber() {
    let (storage_sink, saved) = RecordingSink::new(
        "storage",
        &[EventKind::SaveHistory, EventKind::SaveMemory, EventKind::DistillMemory],
    );
    let harness = start(Some("noted"), vec![storage_sink]);

    push(&harness, speech("remember the milk"));
    wait_for(|| saved.lock().unwrap().len() >= 2);
    shutdown_and_join(harness);

    let saved = saved.lock().unwrap();
    // One user row, one model row
    assert_eq!(saved.len(), 2);
    assert!(saved.iter().all(|e| e.kind == EventKind::SaveHistory));
    assert!(saved.iter().all(|e| e.priority == EventPriority::Low));
}

#[test]
fn direct_output_bypasses_the_model() {
    let (led_sink, lit) = RecordingSink::new("led", &[EventKind::LedOn, EventKind::LedOff]);
    // Model always fails; the bypass must never consult it
    let harness = start(None, vec![led_sink]);

    let inner = Event::output(EventKind::LedOn, Payload::Empty).with_meta("led", "status");
    push(
        &harness,
        Event::input(EventKind::DirectOutput, Payload::Wrapped(Box::new(inner)), "pipe"),
    );
    wait_for(|| !lit.lock().unwrap().is_empty());
    shutdown_and_join(harness);

    let lit = lit.lock().unwrap();
    assert_eq!(lit.len(), 1);
    assert_eq!(lit[0].kind, EventKind::LedOn);
    assert_eq!(lit[0].meta_str("led"), Some("status"));
}

#[test]
fn invalid_direct_output_is_dropped_not_fatal() {
    let (led_sink, lit) = RecordingSink::new("led", &[EventKind::LedOn]);
    let (console_sink, printed) = RecordingSink::new("console", &[EventKind::Speak]);
    let harness = start(Some("still alive"), vec![led_sink, console_sink]);

    // Wrapped input kind: rejected
    let wrapped_input = Event::input(EventKind::UserSpeech, Payload::Text("x".to_string()), "t");
    push(
        &harness,
        Event::input(
            EventKind::DirectOutput,
            Payload::Wrapped(Box::new(wrapped_input)),
            "pipe",
        ),
    );
    // The loop keeps dispatching afterwards
    push(&harness, speech("are you there"));
    wait_for(|| !printed.lock().unwrap().is_empty());
    shutdown_and_join(harness);

    assert!(lit.lock().unwrap().is_empty());
    assert_eq!(printed.lock().unwrap().len(), 1);
}

#[test]
fn model_failure_still_produces_a_spoken_reply() {
    let (console_sink, printed) = RecordingSink::new("console", &[EventKind::Speak]);
    let harness = start(None, vec![console_sink]);

    push(&harness, speech("hello?"));
    wait_for(|| !printed.lock().unwrap().is_empty());
    shutdown_and_join(harness);

    let printed = printed.lock().unwrap();
    assert_eq!(printed.len(), 1);
    assert_eq!(
        printed[0].payload.as_text(),
        Some(BrainConfig::default().fallback_reply.as_str())
    );
}

#[test]
fn unrouted_decision_is_dropped_silently() {
    // Brain emits SaveHistory rows but nothing subscribes to them
    let (console_sink, printed) = RecordingSink::new("console", &[EventKind::Speak]);
    let harness = start(Some("ok"), vec![console_sink]);

    push(&harness, speech("log this"));
    wait_for(|| !printed.lock().unwrap().is_empty());
    shutdown_and_join(harness);

    assert_eq!(printed.lock().unwrap().len(), 1);
}

#[test]
fn voice_shutdown_speaks_a_farewell_before_stopping() {
    let (console_sink, printed) = RecordingSink::new("console", &[EventKind::Speak]);
    let harness = start(Some("unused"), vec![console_sink]);

    push(
        &harness,
        Event::input(EventKind::Shutdown, Payload::Empty, "voice")
            .with_priority(EventPriority::Critical),
    );
    harness.handle.join().expect("orchestrator thread").expect("clean run");

    let printed = printed.lock().unwrap();
    assert_eq!(printed.len(), 1);
    assert_eq!(
        printed[0].payload.as_text(),
        Some(BrainConfig::default().farewell.as_str())
    );
    assert_eq!(printed[0].priority, EventPriority::Critical);
}

#[test]
fn shutdown_outruns_queued_lower_priority_events() {
    let (console_sink, printed) = RecordingSink::new("console", &[EventKind::Speak]);
    let input_queue = Arc::new(EventQueue::bounded("input", 64));

    // Queue a backlog before the loop starts, shutdown last
    input_queue
        .push(Event::input(EventKind::UserSpeech, Payload::Text("x".to_string()), "t"))
        .unwrap();
    input_queue
        .push(
            Event::input(EventKind::SensorTemperature, Payload::Reading(21.0), "t")
                .with_priority(EventPriority::Low),
        )
        .unwrap();
    input_queue
        .push(
            Event::input(EventKind::Shutdown, Payload::Empty, "test")
                .with_priority(EventPriority::Critical),
        )
        .unwrap();

    let brain = Brain::new(
        Box::new(ScriptedModel {
            reply: Some("reply".to_string()),
        }),
        BrainConfig::default(),
    );
    let orchestrator = Orchestrator::assemble(
        brain,
        Vec::new(),
        vec![console_sink],
        Arc::clone(&input_queue),
        Arc::new(AudioArbiter::new("test-device")),
    );
    orchestrator.run().expect("clean run");

    // The critical shutdown was served first, so nothing was ever spoken
    assert!(printed.lock().unwrap().is_empty());
}

#[test]
fn sensor_presence_drives_the_led_subscriber() {
    let (led_sink, lit) = RecordingSink::new("led", &[EventKind::LedOn, EventKind::LedOff]);
    let harness = start(Some("unused"), vec![led_sink]);

    push(
        &harness,
        Event::input(EventKind::SensorPresence, Payload::Flag(true), "radar"),
    );
    push(
        &harness,
        Event::input(EventKind::SensorPresence, Payload::Flag(false), "radar"),
    );
    wait_for(|| lit.lock().unwrap().len() >= 2);
    shutdown_and_join(harness);

    let lit = lit.lock().unwrap();
    assert_eq!(lit.len(), 2);
    assert_eq!(lit[0].kind, EventKind::LedOn);
    assert_eq!(lit[1].kind, EventKind::LedOff);
}
