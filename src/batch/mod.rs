//! Batch orchestration over the single-image pipeline.

pub mod events;
mod runner;

pub use events::StreamEvent;
pub use runner::{BatchItem, BatchMode, CancelFlag, spawn_batch};
