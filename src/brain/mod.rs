//! The Brain - pure decision logic
//!
//! Consumes one input event at a time and returns the output events it
//! implies. The brain knows nothing about queues, adapters, or hardware; its
//! only collaborator is the chat model behind [`ChatModel`], and any failure
//! there degrades to a spoken fallback instead of escaping into the event
//! loop.

use crate::cloud::ChatModel;
use crate::events::{Event, EventKind, EventPriority, Payload};

/// Brain behavior settings
#[derive(Debug, Clone)]
pub struct BrainConfig {
    /// Spoken when the chat model fails or times out
    pub fallback_reply: String,
    /// Spoken on a voice-initiated shutdown
    pub farewell: String,
    /// Temperature at which the brain files a memory note
    pub hot_temperature_c: f64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            fallback_reply: "Sorry, my thoughts are elsewhere right now.".to_string(),
            farewell: "Shutting down. See you soon!".to_string(),
            hot_temperature_c: 30.0,
        }
    }
}

/// Ambient readings the brain remembers between sensor events
#[derive(Debug, Clone, Copy, Default)]
struct Climate {
    temperature_c: Option<f64>,
    humidity_pct: Option<f64>,
}

/// The dispatcher: `process` maps one input event to zero or more outputs
pub struct Brain {
    model: Box<dyn ChatModel>,
    config: BrainConfig,
    climate: Climate,
}

impl Brain {
    /// Create a brain around a chat model collaborator
    #[must_use]
    pub fn new(model: Box<dyn ChatModel>, config: BrainConfig) -> Self {
        Self {
            model,
            config,
            climate: Climate::default(),
        }
    }

    /// Process one input event.
    ///
    /// Never panics and never returns collaborator errors; failures become
    /// fallback output events or an empty list with a log line.
    pub fn process(&mut self, event: &Event) -> Vec<Event> {
        if event.kind.is_output() {
            tracing::warn!(kind = %event.kind, "output event reached the brain, dropping");
            return Vec::new();
        }

        tracing::debug!(event = %event, source = ?event.source, "brain received");

        match event.kind {
            EventKind::DirectOutput => Self::unwrap_direct(event),
            EventKind::UserSpeech | EventKind::PipeCommand => self.handle_user_text(event),
            EventKind::SensorPresence => Self::handle_presence(event),
            EventKind::SensorMovement => {
                tracing::trace!(payload = ?event.payload, "movement observed");
                Vec::new()
            }
            EventKind::SensorTemperature => self.handle_temperature(event),
            EventKind::SensorHumidity => {
                if let Payload::Reading(h) = event.payload {
                    self.climate.humidity_pct = Some(h);
                }
                Vec::new()
            }
            EventKind::Shutdown => self.handle_shutdown(event),
            _ => {
                tracing::warn!(kind = %event.kind, "unhandled input kind");
                Vec::new()
            }
        }
    }

    /// Last observed temperature, if any
    #[must_use]
    pub const fn temperature_c(&self) -> Option<f64> {
        self.climate.temperature_c
    }

    /// Last observed humidity, if any
    #[must_use]
    pub const fn humidity_pct(&self) -> Option<f64> {
        self.climate.humidity_pct
    }

    /// `DIRECT_OUTPUT` bypass: deliver the wrapped output event verbatim.
    ///
    /// This is a first-class seam for driving output adapters without the
    /// chat model (hardware tests, external tooling). Two guards keep it
    /// sound: the wrapped event must be an output kind, and wrapping another
    /// `DIRECT_OUTPUT` is rejected to rule out unbounded unwrapping.
    fn unwrap_direct(event: &Event) -> Vec<Event> {
        let Payload::Wrapped(inner) = &event.payload else {
            tracing::warn!("direct_output without a wrapped event, dropping");
            return Vec::new();
        };

        if inner.kind == EventKind::DirectOutput {
            tracing::warn!("nested direct_output rejected");
            return Vec::new();
        }
        if inner.kind.is_input() {
            tracing::warn!(kind = %inner.kind, "direct_output wrapping an input kind rejected");
            return Vec::new();
        }

        tracing::debug!(kind = %inner.kind, "direct_output bypass");
        vec![(**inner).clone()]
    }

    fn handle_user_text(&mut self, event: &Event) -> Vec<Event> {
        let Some(text) = event.payload.as_text() else {
            tracing::warn!(kind = %event.kind, "user input without text payload");
            return Vec::new();
        };

        let mut outputs = vec![history_event("user", text, event.source.as_deref())];

        match self.model.reply(text) {
            Ok(reply) => {
                outputs.push(history_event("model", &reply, None));
                // Speak only when the user spoke; pipe commands reply silently
                if event.kind == EventKind::UserSpeech {
                    outputs.push(
                        Event::output(EventKind::Speak, Payload::Text(reply))
                            .with_priority(EventPriority::High)
                            .with_meta("triggered_by", "user_speech"),
                    );
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "chat model failed, speaking fallback");
                outputs.push(
                    Event::output(
                        EventKind::Speak,
                        Payload::Text(self.config.fallback_reply.clone()),
                    )
                    .with_priority(EventPriority::High)
                    .with_meta("fallback", true),
                );
            }
        }

        outputs
    }

    fn handle_presence(event: &Event) -> Vec<Event> {
        let Payload::Flag(present) = event.payload else {
            tracing::warn!("presence event without flag payload");
            return Vec::new();
        };

        let kind = if present { EventKind::LedOn } else { EventKind::LedOff };
        vec![Event::output(kind, Payload::Empty).with_meta("led", "status")]
    }

    fn handle_temperature(&mut self, event: &Event) -> Vec<Event> {
        let Payload::Reading(temp) = event.payload else {
            tracing::warn!("temperature event without reading payload");
            return Vec::new();
        };

        let previous = self.climate.temperature_c.replace(temp);
        let was_hot = previous.is_some_and(|t| t >= self.config.hot_temperature_c);

        // File a note on the rising edge only
        if temp >= self.config.hot_temperature_c && !was_hot {
            tracing::debug!(temp, "temperature crossed the hot threshold");
            return vec![
                Event::output(
                    EventKind::SaveMemory,
                    Payload::Record(serde_json::json!({
                        "category": "environment",
                        "content": format!("Room got hot: {temp:.1}C"),
                    })),
                )
                .with_priority(EventPriority::Low),
            ];
        }

        Vec::new()
    }

    fn handle_shutdown(&mut self, event: &Event) -> Vec<Event> {
        tracing::info!(source = ?event.source, "shutdown requested");
        if event.source.as_deref() == Some("voice") {
            return vec![
                Event::output(EventKind::Speak, Payload::Text(self.config.farewell.clone()))
                    .with_priority(EventPriority::Critical),
            ];
        }
        Vec::new()
    }
}

fn history_event(role: &str, text: &str, source: Option<&str>) -> Event {
    let mut record = serde_json::json!({"role": role, "text": text});
    if let Some(source) = source {
        record["source"] = serde_json::Value::String(source.to_string());
    }
    Event::output(EventKind::SaveHistory, Payload::Record(record))
        .with_priority(EventPriority::Low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    struct ScriptedModel {
        reply: Option<String>,
    }

    impl ChatModel for ScriptedModel {
        fn reply(&mut self, _prompt: &str) -> Result<String> {
            self.reply
                .clone()
                .ok_or_else(|| crate::Error::Llm("unreachable".to_string()))
        }
    }

    fn brain_with(reply: Option<&str>) -> Brain {
        Brain::new(
            Box::new(ScriptedModel {
                reply: reply.map(ToString::to_string),
            }),
            BrainConfig::default(),
        )
    }

    fn speech(text: &str) -> Event {
        Event::input(EventKind::UserSpeech, Payload::Text(text.to_string()), "voice")
    }

    #[test]
    fn user_speech_yields_history_and_spoken_reply() {
        let mut brain = brain_with(Some("hello there"));
        let outputs = brain.process(&speech("hi"));

        let kinds: Vec<EventKind> = outputs.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [EventKind::SaveHistory, EventKind::SaveHistory, EventKind::Speak]
        );
        assert_eq!(outputs[2].payload.as_text(), Some("hello there"));
        assert_eq!(outputs[2].priority, EventPriority::High);
    }

    #[test]
    fn pipe_command_replies_without_speaking() {
        let mut brain = brain_with(Some("ack"));
        let event = Event::input(
            EventKind::PipeCommand,
            Payload::Text("status?".to_string()),
            "pipe",
        );
        let outputs = brain.process(&event);
        assert!(outputs.iter().all(|e| e.kind != EventKind::Speak));
        assert_eq!(
            outputs.iter().filter(|e| e.kind == EventKind::SaveHistory).count(),
            2
        );
    }

    #[test]
    fn model_failure_degrades_to_fallback_speak() {
        let mut brain = brain_with(None);
        let outputs = brain.process(&speech("hi"));

        assert!(!outputs.is_empty());
        let speak = outputs
            .iter()
            .find(|e| e.kind == EventKind::Speak)
            .expect("fallback speak event");
        assert_eq!(
            speak.payload.as_text(),
            Some(BrainConfig::default().fallback_reply.as_str())
        );
    }

    #[test]
    fn direct_output_unwraps_valid_output_event() {
        let mut brain = brain_with(None);
        let inner = Event::output(EventKind::LedOn, Payload::Empty).with_meta("led", "status");
        let wrapper = Event::input(
            EventKind::DirectOutput,
            Payload::Wrapped(Box::new(inner.clone())),
            "pipe",
        );

        let outputs = brain.process(&wrapper);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].kind, EventKind::LedOn);
        assert_eq!(outputs[0].meta_str("led"), Some("status"));
    }

    #[test]
    fn direct_output_rejects_wrapped_input_kind() {
        let mut brain = brain_with(None);
        let inner = Event::input(EventKind::UserSpeech, Payload::Text("x".to_string()), "t");
        let wrapper = Event::input(
            EventKind::DirectOutput,
            Payload::Wrapped(Box::new(inner)),
            "pipe",
        );
        assert!(brain.process(&wrapper).is_empty());
    }

    #[test]
    fn direct_output_rejects_nesting() {
        let mut brain = brain_with(None);
        let innermost = Event::output(EventKind::LedOn, Payload::Empty);
        let middle = Event::input(
            EventKind::DirectOutput,
            Payload::Wrapped(Box::new(innermost)),
            "pipe",
        );
        let wrapper = Event::input(
            EventKind::DirectOutput,
            Payload::Wrapped(Box::new(middle)),
            "pipe",
        );
        assert!(brain.process(&wrapper).is_empty());
    }

    #[test]
    fn output_kind_as_primary_input_is_dropped() {
        let mut brain = brain_with(Some("x"));
        let event = Event::output(EventKind::Speak, Payload::Text("oops".to_string()));
        assert!(brain.process(&event).is_empty());
    }

    #[test]
    fn presence_drives_status_led() {
        let mut brain = brain_with(None);
        let arrive = Event::input(EventKind::SensorPresence, Payload::Flag(true), "radar");
        let leave = Event::input(EventKind::SensorPresence, Payload::Flag(false), "radar");

        let on = brain.process(&arrive);
        assert_eq!(on.len(), 1);
        assert_eq!(on[0].kind, EventKind::LedOn);

        let off = brain.process(&leave);
        assert_eq!(off[0].kind, EventKind::LedOff);
    }

    #[test]
    fn hot_temperature_files_one_memory_note() {
        let mut brain = brain_with(None);
        let reading = |t: f64| {
            Event::input(EventKind::SensorTemperature, Payload::Reading(t), "dht11")
        };

        assert!(brain.process(&reading(22.0)).is_empty());
        let note = brain.process(&reading(31.5));
        assert_eq!(note.len(), 1);
        assert_eq!(note[0].kind, EventKind::SaveMemory);
        // Still hot: no duplicate note
        assert!(brain.process(&reading(32.0)).is_empty());
        assert_eq!(brain.temperature_c(), Some(32.0));
    }

    #[test]
    fn voice_shutdown_says_farewell() {
        let mut brain = brain_with(None);
        let event = Event::input(EventKind::Shutdown, Payload::Empty, "voice");
        let outputs = brain.process(&event);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].kind, EventKind::Speak);
        assert_eq!(outputs[0].priority, EventPriority::Critical);

        let quiet = Event::input(EventKind::Shutdown, Payload::Empty, "keyboard");
        assert!(brain.process(&quiet).is_empty());
    }
}
