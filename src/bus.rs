//! In-process message bus: typed events, fan-out queue, channel adapters.

pub mod adapters;
pub mod events;
pub mod format;
pub mod media;
pub mod queue;

pub use adapters::{ChannelAdapter, ChannelAdapterDyn};
pub use events::{Channel, InboundMessage, OutboundMessage, SystemEvent};
pub use media::MediaDownloader;
pub use queue::{BusSubscriber, MessageBus};
