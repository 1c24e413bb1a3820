//! Domain errors

use thiserror::Error;

/// Domain result type
pub type Result<T> = std::result::Result<T, DomainError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Call history cannot be read on this device
    #[error("Call history permission unavailable")]
    PermissionUnavailable,

    /// Call history has not caught up with the call that just ended
    #[error("Call history query returned no rows: {0}")]
    TransientQueryEmpty(String),

    /// A persisted value could not be decoded
    #[error("Persisted state is corrupt: {0}")]
    PersistenceCorruption(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No live consumer, or the hand-off to it failed
    #[error("Delivery path unavailable: {0}")]
    DeliveryPathUnavailable(String),

    #[error("Duplicate signal: {0}")]
    DuplicateSignal(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::PersistenceCorruption(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Persistence(err.to_string())
    }
}
