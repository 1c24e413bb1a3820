//! HTTP and WebSocket API

pub mod dto;
pub mod metrics_handler;
pub mod router;
pub mod signals_handler;
pub mod ws_handler;

pub use metrics_handler::init_metrics;
pub use router::build_router;
pub use signals_handler::ApiState;
pub use ws_handler::LiveConsumerHub;
