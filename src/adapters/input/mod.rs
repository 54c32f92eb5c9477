//! Input adapters
//!
//! Each adapter owns a source and pushes into the shared input queue from a
//! worker thread. A full queue rejects the push; adapters log the drop and
//! keep producing.

mod climate;
mod direct;
mod keyboard;
#[cfg(unix)]
mod pipe;
mod radar;
mod voice;

pub use climate::{ClimateInput, ClimateReading, ClimateSensor, ScriptedClimateSensor};
pub use direct::DirectInput;
pub use keyboard::KeyboardInput;
#[cfg(unix)]
pub use pipe::PipeInput;
pub use radar::{PresenceSample, PresenceSensor, RadarInput, ScriptedPresenceSensor};
pub use voice::{SpeechSegmenter, VoiceInput};

use std::sync::Arc;

use crate::events::{Event, EventQueue};

/// Push into the shared input queue, logging the drop on overflow
pub(crate) fn push_or_drop(queue: &Arc<EventQueue>, event: Event) {
    if let Err(full) = queue.push(event) {
        tracing::warn!(
            kind = %full.kind,
            capacity = full.capacity,
            "input queue full, dropping event"
        );
    }
}
