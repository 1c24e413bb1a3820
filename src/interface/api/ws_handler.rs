//! WebSocket live consumer
//!
//! Connected clients share one broadcast sink. The first client to connect
//! attaches it to the tracker, which drains the pending buffer into it; the
//! last one to leave detaches it so new events are buffered again.

use crate::application::CallTracker;
use crate::domain::call::CallEvent;
use crate::domain::delivery::EventSink;
use crate::domain::shared::{DomainError, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

struct BroadcastSink {
    tx: broadcast::Sender<CallEvent>,
}

impl EventSink for BroadcastSink {
    fn send(&self, event: &CallEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| DomainError::DeliveryPathUnavailable("no websocket client listening".to_string()))
    }
}

pub struct LiveConsumerHub {
    tracker: Arc<CallTracker>,
    tx: broadcast::Sender<CallEvent>,
    clients: Mutex<usize>,
}

impl LiveConsumerHub {
    pub fn new(tracker: Arc<CallTracker>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tracker,
            tx,
            clients: Mutex::new(0),
        }
    }

    /// Register a client. Subscribes before attaching so the drained
    /// backlog reaches it.
    pub fn connect(&self) -> broadcast::Receiver<CallEvent> {
        let rx = self.tx.subscribe();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        *clients += 1;
        if *clients == 1 {
            let drained = self.tracker.attach(Arc::new(BroadcastSink { tx: self.tx.clone() }));
            info!("First live client attached, {} buffered events drained", drained);
        }
        rx
    }

    pub fn disconnect(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        *clients = clients.saturating_sub(1);
        if *clients == 0 {
            self.tracker.detach();
        }
    }

    pub fn client_count(&self) -> usize {
        *self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<LiveConsumerHub>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<LiveConsumerHub>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = hub.connect();
    info!("WebSocket client connected ({} total)", hub.client_count());

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagged, {} events skipped", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        debug!("Failed to send event to WebSocket client");
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize event: {}", e),
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    hub.disconnect();
    info!("WebSocket client disconnected");
}
