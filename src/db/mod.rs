//! Persistence layer

pub mod schema;
mod store;

pub use store::{HistoryRow, MemoryRow, MemoryStore};
