//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Key-value store implementations (memory, JSON file, PostgreSQL)
//! - Call history and remote store adapters
//! - Status presentation

pub mod call_log;
pub mod notification;
pub mod persistence;
pub mod remote;
