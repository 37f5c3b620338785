//! Channel adapter trait and dynamic dispatch companion.
//!
//! Each chat channel implements [`ChannelAdapter`]; the application
//! container constructs an adapter only when its channel is configured, so
//! a missing credential is a startup config error rather than a deferred
//! runtime failure.

pub mod web;
pub mod whatsapp;

use crate::bus::events::{Channel, OutboundMessage};
use crate::bus::queue::MessageBus;
use crate::error::Result;
use std::pin::Pin;
use std::sync::Arc;

/// Static trait for channel adapters.
/// Use this for type-safe implementations.
pub trait ChannelAdapter: Send + Sync + 'static {
    /// The channel this adapter serves.
    fn channel(&self) -> Channel;

    /// Start the adapter: connect transport resources and begin consuming
    /// outbound bus events addressed to this channel.
    fn start(&self, bus: &MessageBus) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Release resources and drain buffers.
    fn stop(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Write one outbound message to the channel. Streamed chunks may be
    /// buffered; the buffer flushes on `is_stream_end`.
    fn send(&self, message: OutboundMessage) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Dynamic trait for runtime polymorphism.
/// Use this when you need `Arc<dyn ChannelAdapterDyn>` for storing different adapters.
pub trait ChannelAdapterDyn: Send + Sync + 'static {
    fn channel(&self) -> Channel;

    fn start<'a>(
        &'a self,
        bus: &'a MessageBus,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn stop<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn send<'a>(
        &'a self,
        message: OutboundMessage,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;
}

/// Blanket implementation: any type implementing ChannelAdapter automatically
/// implements ChannelAdapterDyn.
impl<T: ChannelAdapter> ChannelAdapterDyn for T {
    fn channel(&self) -> Channel {
        ChannelAdapter::channel(self)
    }

    fn start<'a>(
        &'a self,
        bus: &'a MessageBus,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChannelAdapter::start(self, bus))
    }

    fn stop<'a>(&'a self) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChannelAdapter::stop(self))
    }

    fn send<'a>(
        &'a self,
        message: OutboundMessage,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChannelAdapter::send(self, message))
    }
}

/// Spawn the outbound delivery loop for an adapter.
///
/// Subscribes to the bus, filters events for the adapter's channel, and
/// forwards each to `send`. Send failures are logged and never propagate;
/// outbound delivery is best-effort.
pub fn spawn_outbound_loop(
    adapter: Arc<dyn ChannelAdapterDyn>,
    bus: &MessageBus,
) -> tokio::task::JoinHandle<()> {
    let mut subscriber = bus.subscribe_outbound();
    tokio::spawn(async move {
        let channel = adapter.channel();
        while let Some(message) = subscriber.recv().await {
            if message.channel != channel {
                continue;
            }
            if let Err(error) = adapter.send(message).await {
                tracing::warn!(%error, %channel, "outbound send failed");
            }
        }
        tracing::debug!(%channel, "outbound loop ended: bus closed");
    })
}
