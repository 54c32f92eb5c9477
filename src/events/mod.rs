//! Event model
//!
//! Everything that flows through the system is an [`Event`]: a priority, a
//! kind from a closed set, a payload shaped by that kind, and bookkeeping
//! metadata. Kinds are partitioned into two disjoint families: input kinds
//! travel world -> brain, output kinds travel brain -> world. The brain never
//! receives an output kind as primary input except wrapped in
//! [`EventKind::DirectOutput`].

pub mod queue;

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use queue::{EventQueue, QueueFull};

/// Event priority. Lower rank is served first; equal ranks are FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    /// Emergencies (shutdown, stop)
    Critical,
    /// Direct user commands and replies to them
    High,
    /// Ordinary operation
    Normal,
    /// Background bookkeeping (history, archiving)
    Low,
}

impl EventPriority {
    /// Numeric rank, lower is more urgent
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

/// The closed set of event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // -- Input kinds (world -> brain) --
    /// Recognized user speech (text)
    UserSpeech,
    /// Line command received on the named pipe
    PipeCommand,
    /// Radar presence changed
    SensorPresence,
    /// Radar movement changed
    SensorMovement,
    /// Temperature reading
    SensorTemperature,
    /// Humidity reading
    SensorHumidity,
    /// Escape hatch: payload is itself an output event to deliver verbatim
    DirectOutput,
    /// Stop the whole system
    Shutdown,

    // -- Output kinds (brain -> world) --
    /// Speak text aloud
    Speak,
    /// Turn a LED on
    LedOn,
    /// Turn a LED off
    LedOff,
    /// Blink a LED
    LedBlink,
    /// Append a conversation turn to history
    SaveHistory,
    /// Append a fact to permanent memory
    SaveMemory,
    /// Compact recent history into a memory record
    DistillMemory,
}

impl EventKind {
    /// True for kinds that flow from the world into the brain
    #[must_use]
    pub const fn is_input(self) -> bool {
        matches!(
            self,
            Self::UserSpeech
                | Self::PipeCommand
                | Self::SensorPresence
                | Self::SensorMovement
                | Self::SensorTemperature
                | Self::SensorHumidity
                | Self::DirectOutput
                | Self::Shutdown
        )
    }

    /// True for kinds that flow from the brain out to an adapter
    #[must_use]
    pub const fn is_output(self) -> bool {
        !self.is_input()
    }

    /// Stable lowercase name, matching the serde representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserSpeech => "user_speech",
            Self::PipeCommand => "pipe_command",
            Self::SensorPresence => "sensor_presence",
            Self::SensorMovement => "sensor_movement",
            Self::SensorTemperature => "sensor_temperature",
            Self::SensorHumidity => "sensor_humidity",
            Self::DirectOutput => "direct_output",
            Self::Shutdown => "shutdown",
            Self::Speak => "speak",
            Self::LedOn => "led_on",
            Self::LedOff => "led_off",
            Self::LedBlink => "led_blink",
            Self::SaveHistory => "save_history",
            Self::SaveMemory => "save_memory",
            Self::DistillMemory => "distill_memory",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload. Shape is determined by the event kind; the queue and the
/// router never inspect it.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No payload
    Empty,
    /// Free text (speech, pipe commands, TTS input)
    Text(String),
    /// Boolean state (presence, movement)
    Flag(bool),
    /// Numeric reading (temperature, humidity)
    Reading(f64),
    /// Structured record (history rows, memory facts)
    Record(serde_json::Value),
    /// A wrapped event (`DirectOutput` only)
    Wrapped(Box<Event>),
}

impl Payload {
    /// Best-effort conversion from loosely typed JSON (pipe commands, config)
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Empty,
            serde_json::Value::Bool(b) => Self::Flag(b),
            serde_json::Value::Number(n) => {
                n.as_f64().map_or(Self::Empty, Self::Reading)
            }
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Record(other),
        }
    }

    /// Payload text, if this is a text payload
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Open key-value map for auxiliary detail (sensor readings, LED names)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The unit of communication between components
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Scheduling priority
    pub priority: EventPriority,
    /// Kind tag from the closed set
    pub kind: EventKind,
    /// Kind-shaped payload
    pub payload: Payload,
    /// Creation instant (monotonic; ordering inside a queue is arrival order,
    /// not this timestamp)
    pub timestamp: Instant,
    /// Origin identifier, required for input events
    pub source: Option<String>,
    /// Auxiliary structured detail
    pub metadata: Metadata,
}

impl Event {
    /// Create an input event. `source` identifies the producing adapter.
    #[must_use]
    pub fn input(kind: EventKind, payload: Payload, source: &str) -> Self {
        debug_assert!(kind.is_input(), "{kind} is not an input kind");
        Self {
            priority: EventPriority::Normal,
            kind,
            payload,
            timestamp: Instant::now(),
            source: Some(source.to_string()),
            metadata: Metadata::new(),
        }
    }

    /// Create an output event
    #[must_use]
    pub fn output(kind: EventKind, payload: Payload) -> Self {
        debug_assert!(kind.is_output(), "{kind} is not an output kind");
        Self {
            priority: EventPriority::Normal,
            kind,
            payload,
            timestamp: Instant::now(),
            source: None,
            metadata: Metadata::new(),
        }
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach one metadata entry
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Metadata string value, if present
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.kind, self.priority)?;
        if let Some(text) = self.payload.as_text() {
            let short: String = text.chars().take(40).collect();
            write!(f, " \"{short}\"")?;
        }
        Ok(())
    }
}
