//! Audio hardware access
//!
//! Capture and playback over cpal, plus the arbiter that serializes access to
//! the shared microphone/speaker device.

mod arbiter;
mod capture;
mod playback;

pub use arbiter::{AudioArbiter, Claim, DeviceState};
pub use capture::{CAPTURE_SAMPLE_RATE, Microphone, samples_to_wav};
pub use playback::Speaker;
