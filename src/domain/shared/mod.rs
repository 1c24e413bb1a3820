//! Shared kernel - Common types used by every component of the engine

pub mod clock;
pub mod error;
pub mod value_objects;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, Result};
pub use value_objects::*;
