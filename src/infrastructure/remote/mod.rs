//! Remote store adapters

pub mod memory;

pub use memory::InMemoryRemoteStore;
