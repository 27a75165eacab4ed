//! ResourceTracker store and garbage collector.

pub mod compression;
pub mod gc;
pub mod store;

pub use gc::{mark_and_sweep, GcConfig, GcReport, ResourceDeleter};
pub use store::{InMemoryTrackerStore, TrackerStore};
