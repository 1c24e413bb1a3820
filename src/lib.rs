//! calltrack - call-lifecycle correlation engine
//!
//! Observes a phone call through several racing, partial signal sources
//! and rebuilds one canonical, deduplicated event per call, delivered to a
//! live consumer and, durably, to a remote store.
//!
//! Layered as domain / application / infrastructure / interface, with
//! configuration in `config`.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use application::CallTracker;
pub use domain::shared::{DomainError, Result};
