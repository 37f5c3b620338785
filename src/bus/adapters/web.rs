//! Web dashboard adapter for browser-based sessions.
//!
//! Unlike other adapters, this does not own a transport. Inbound messages
//! are injected by the WebSocket API handler, and outbound responses plus
//! system telemetry are routed to per-session channels consumed by the
//! socket tasks.

use crate::bus::adapters::{ChannelAdapter, spawn_outbound_loop};
use crate::bus::events::{Channel, OutboundMessage, SystemEvent};
use crate::bus::queue::MessageBus;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};

/// Events delivered to a connected dashboard session.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebEvent {
    Message {
        chat_id: String,
        content: String,
        is_stream_chunk: bool,
        is_stream_end: bool,
    },
    System(SystemEvent),
}

/// Web dashboard adapter state.
pub struct WebDashboardAdapter {
    sessions: Arc<RwLock<HashMap<String, mpsc::Sender<WebEvent>>>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl WebDashboardAdapter {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register a dashboard session and return its event receiver.
    pub async fn register_session(&self, session_id: &str) -> mpsc::Receiver<WebEvent> {
        let (tx, rx) = mpsc::channel(256);
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), tx);
        tracing::debug!(%session_id, "web session registered");
        rx
    }

    pub async fn unregister_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
        tracing::debug!(%session_id, "web session unregistered");
    }

    /// Fan a system event out to every connected session.
    ///
    /// A session whose queue is full simply misses the event; telemetry is
    /// best-effort and must never stall the publisher.
    async fn broadcast_system(sessions: &RwLock<HashMap<String, mpsc::Sender<WebEvent>>>, event: SystemEvent) {
        let sessions = sessions.read().await;
        for tx in sessions.values() {
            let _ = tx.try_send(WebEvent::System(event.clone()));
        }
    }
}

impl Default for WebDashboardAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelAdapter for WebDashboardAdapter {
    fn channel(&self) -> Channel {
        Channel::Web
    }

    async fn start(&self, bus: &MessageBus) -> Result<()> {
        let sessions = self.sessions.clone();
        let mut system_rx = bus.subscribe_system();
        let system_loop = tokio::spawn(async move {
            while let Some(event) = system_rx.recv().await {
                Self::broadcast_system(&sessions, event).await;
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(system_loop);
        tracing::info!("web dashboard adapter started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
        self.sessions.write().await.clear();
        tracing::info!("web dashboard adapter stopped");
        Ok(())
    }

    async fn send(&self, message: OutboundMessage) -> Result<()> {
        let sessions = self.sessions.read().await;
        let Some(tx) = sessions.get(&message.chat_id) else {
            tracing::debug!(chat_id = %message.chat_id, "no web session for outbound message");
            return Ok(());
        };

        let _ = tx
            .send(WebEvent::Message {
                chat_id: message.chat_id.clone(),
                content: message.content,
                is_stream_chunk: message.is_stream_chunk,
                is_stream_end: message.is_stream_end,
            })
            .await;
        Ok(())
    }
}

/// Wire the adapter's outbound loop onto the bus after `start`.
pub async fn attach_outbound(adapter: &Arc<WebDashboardAdapter>, bus: &MessageBus) {
    let handle = spawn_outbound_loop(adapter.clone(), bus);
    adapter.tasks.lock().await.push(handle);
}
