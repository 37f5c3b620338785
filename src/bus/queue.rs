//! Typed publish/subscribe queue with multi-subscriber fan-out.
//!
//! Built on `tokio::sync::broadcast`: publishing never blocks, each
//! subscriber has its own cursor, and a subscriber that falls behind loses
//! the oldest events (surfaced as a logged warning on its next receive).
//! Delivery is at-most-once best-effort; durable state lives in the store.

use crate::bus::events::{InboundMessage, OutboundMessage, SystemEvent};
use tokio::sync::broadcast;

/// Per-family channel capacity before the oldest events are dropped.
const BUS_CAPACITY: usize = 1024;

/// The in-process message bus. Cheap to clone; clones share the channels.
#[derive(Debug, Clone)]
pub struct MessageBus {
    inbound_tx: broadcast::Sender<InboundMessage>,
    outbound_tx: broadcast::Sender<OutboundMessage>,
    system_tx: broadcast::Sender<SystemEvent>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (inbound_tx, _) = broadcast::channel(BUS_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(BUS_CAPACITY);
        let (system_tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            inbound_tx,
            outbound_tx,
            system_tx,
        }
    }

    /// Publish an inbound message. Non-blocking; a send with no subscribers
    /// is not an error.
    pub fn publish_inbound(&self, message: InboundMessage) {
        let _ = self.inbound_tx.send(message);
    }

    pub fn publish_outbound(&self, message: OutboundMessage) {
        let _ = self.outbound_tx.send(message);
    }

    pub fn publish_system(&self, event: SystemEvent) {
        let _ = self.system_tx.send(event);
    }

    pub fn subscribe_inbound(&self) -> BusSubscriber<InboundMessage> {
        BusSubscriber {
            rx: self.inbound_tx.subscribe(),
            family: "inbound",
        }
    }

    pub fn subscribe_outbound(&self) -> BusSubscriber<OutboundMessage> {
        BusSubscriber {
            rx: self.outbound_tx.subscribe(),
            family: "outbound",
        }
    }

    pub fn subscribe_system(&self) -> BusSubscriber<SystemEvent> {
        BusSubscriber {
            rx: self.system_tx.subscribe(),
            family: "system",
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber handle for one event family.
pub struct BusSubscriber<T> {
    rx: broadcast::Receiver<T>,
    family: &'static str,
}

impl<T: Clone> BusSubscriber<T> {
    /// Receive the next event, skipping over any dropped backlog.
    ///
    /// Returns `None` once the bus has been dropped and the backlog drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(family = self.family, skipped, "slow bus subscriber dropped events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive. `None` when no event is ready.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(family = self.family, skipped, "slow bus subscriber dropped events");
                }
                Err(_) => return None,
            }
        }
    }
}
