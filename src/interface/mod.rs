//! Interface layer - External interfaces
//!
//! This layer handles:
//! - REST endpoints for signal sources and operators
//! - The WebSocket live consumer
//! - Request/response formatting
pub mod api;
