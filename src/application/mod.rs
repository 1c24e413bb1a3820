//! Application layer - Use cases and application services
//!
//! This layer orchestrates domain objects to fulfill use cases:
//! - Wiring the tracker that signal sources feed
//! - Running the durable background delivery jobs

pub mod call_tracker;
pub mod delivery_worker;

pub use call_tracker::{CallTracker, TrackerSettings};
pub use delivery_worker::{DeliveryWorker, NetworkMonitor, RetryPolicy, WorkerConfig, WorkerHandle};
