//! Call history adapters

pub mod snapshot;

pub use snapshot::SnapshotCallLog;
