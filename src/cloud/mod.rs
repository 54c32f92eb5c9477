//! Cloud collaborator interfaces
//!
//! The core talks to the outside world through three narrow traits: a chat
//! model, a transcriber, and a synthesizer. Every implementation carries a
//! bounded request timeout; callers turn failures into fallback events, never
//! into faults inside the event loop.

mod llm;
mod stt;
mod tts;

pub use llm::{ChatModel, HttpChatModel};
pub use stt::{HttpTranscriber, SpeechToText};
pub use tts::{HttpSynthesizer, TextToSpeech};
