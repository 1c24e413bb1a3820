//! Call bounded context - the canonical call event and the raw signals it is
//! reconstructed from

pub mod event;
pub mod signal;
pub mod value_object;

pub use event::CallEvent;
pub use signal::Signal;
pub use value_object::{CallDirection, CallOutcome, TelephonyState};
