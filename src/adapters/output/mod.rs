//! Output adapters
//!
//! Each adapter drains its own bounded delivery queue on a worker thread.
//! Workers drain whatever is already queued before honoring a stop request,
//! so a farewell routed just before shutdown still gets delivered.

mod console;
mod led;
mod speech;
mod storage;

pub use console::ConsoleOutput;
pub use led::{LedDriver, LedOutput, MockLedDriver, SysfsLedDriver};
pub use speech::SpeechOutput;
pub use storage::StorageOutput;
