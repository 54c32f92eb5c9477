//! Buddy - event-driven voice assistant core
//!
//! Everything in Buddy is an event on a priority queue. Input adapters turn
//! the world (microphone, keyboard, named pipe, sensors) into input events;
//! the brain turns each input event into output decisions; the router fans
//! decisions out to the output adapters (speaker, LEDs, console, storage)
//! that declared an interest in them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  Input adapters                       │
//! │   Voice  │  Keyboard  │  Pipe  │  Radar  │  Climate  │
//! └────────────────────┬─────────────────────────────────┘
//!                      │  shared priority queue
//! ┌────────────────────▼─────────────────────────────────┐
//! │              Orchestrator + Brain                     │
//! │   one event in, zero or more output events out        │
//! └────────────────────┬─────────────────────────────────┘
//!                      │  derived fan-out routes
//! ┌────────────────────▼─────────────────────────────────┐
//! │                  Output adapters                      │
//! │   Speech  │  Console  │  LED  │  Storage              │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The microphone and speaker share one physical device; the
//! [`audio::AudioArbiter`] keeps them from holding it at the same time.

pub mod adapters;
pub mod audio;
pub mod brain;
pub mod cloud;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod router;

pub use audio::{AudioArbiter, DeviceState};
pub use brain::{Brain, BrainConfig};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{Event, EventKind, EventPriority, EventQueue, Payload};
pub use orchestrator::Orchestrator;
pub use router::EventRouter;
