use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use crate::session::Engine;

/// Connected WebSocket client info
#[derive(Debug)]
pub struct ConnectedClient {
    pub connected_at: Instant,
}

/// Shared application state: the engine plus the WebSocket client registry.
pub struct AppState {
    pub engine: Arc<Engine>,

    /// Connected WebSocket clients: client_id -> client info
    pub connected_clients: DashMap<String, ConnectedClient>,

    connection_count: AtomicUsize,

    /// Engine events re-encoded as JSON for the WebSocket feed.
    ws_broadcast: broadcast::Sender<serde_json::Value>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Arc<Self> {
        let (tx, _) = broadcast::channel(1024);
        let state = Arc::new(Self {
            engine,
            connected_clients: DashMap::new(),
            connection_count: AtomicUsize::new(0),
            ws_broadcast: tx,
        });
        state.spawn_event_relay();
        state
    }

    /// Forward engine events onto the WebSocket broadcast.
    fn spawn_event_relay(self: &Arc<Self>) {
        let mut events = self.engine.subscribe();
        let ws = self.ws_broadcast.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match serde_json::to_value(&event) {
                        Ok(value) => {
                            let _ = ws.send(value);
                        }
                        Err(err) => tracing::warn!("Could not encode engine event: {}", err),
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("WebSocket relay lagged, {} events dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn broadcast(&self, value: serde_json::Value) {
        // Ignore send errors (no receivers)
        let _ = self.ws_broadcast.send(value);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.ws_broadcast.subscribe()
    }

    pub fn pong(&self) {
        self.broadcast(json!({ "event": "pong" }));
    }

    pub fn client_connected(&self, client_id: &str) {
        self.connected_clients.insert(
            client_id.to_string(),
            ConnectedClient {
                connected_at: Instant::now(),
            },
        );
        let count = self.connection_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            "Client {} connected (total: {}, active: {})",
            client_id,
            count,
            self.connected_clients.len()
        );
    }

    pub fn client_disconnected(&self, client_id: &str) {
        if let Some((_, client)) = self.connected_clients.remove(client_id) {
            tracing::debug!(
                "Client {} disconnected after {:?} (active: {})",
                client_id,
                client.connected_at.elapsed(),
                self.connected_clients.len()
            );
        }
    }

    pub fn active_connection_count(&self) -> usize {
        self.connected_clients.len()
    }
}
