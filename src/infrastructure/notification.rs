//! Presenter that writes call status to the log

use crate::domain::notification::{CallStatus, NotificationPresenter};
use tracing::info;

#[derive(Debug, Default)]
pub struct TracingNotificationPresenter;

impl NotificationPresenter for TracingNotificationPresenter {
    fn present(&self, status: &CallStatus) {
        match status {
            CallStatus::Dialing { number } => info!("Calling {}", number),
            CallStatus::Ringing { number: Some(number) } => info!("Incoming call from {}", number),
            CallStatus::Ringing { number: None } => info!("Incoming call"),
            CallStatus::InCall { number, direction } => info!(
                "In call ({}) with {}",
                direction.as_str(),
                number.as_ref().map(|n| n.as_str()).unwrap_or("unknown")
            ),
            CallStatus::Ended { number, outcome } => info!("Call with {} {}", number, outcome.as_str()),
        }
    }
}
