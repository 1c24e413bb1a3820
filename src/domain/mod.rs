//! Domain layer - call correlation rules
//!
//! This layer contains:
//! - Value objects: phone keys, correlation ids, call outcomes
//! - Registries over the key-value store: identities, outgoing markers,
//!   finalization guards, the durable event queue
//! - The call state reconciler that turns racing signals into events
//! - Ports for the call history, the remote store, the live consumer and
//!   background jobs

pub mod call;
pub mod call_log;
pub mod delivery;
pub mod event_queue;
pub mod finalization;
pub mod identity;
pub mod marker;
pub mod notification;
pub mod reconciler;
pub mod shared;
pub mod storage;

// Re-export commonly used types
pub use shared::{DomainError, Result};
