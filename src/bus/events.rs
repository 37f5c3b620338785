//! Event types carried on the message bus.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Chat channels known to the bus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Discord,
    Slack,
    Telegram,
    Whatsapp,
    Web,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Discord => "discord",
            Channel::Slack => "slack",
            Channel::Telegram => "telegram",
            Channel::Whatsapp => "whatsapp",
            Channel::Web => "web",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "discord" => Some(Channel::Discord),
            "slack" => Some(Channel::Slack),
            "telegram" => Some(Channel::Telegram),
            "whatsapp" => Some(Channel::Whatsapp),
            "web" => Some(Channel::Web),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message arriving from a chat channel, normalized by its adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: Channel,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    /// Local filesystem paths of downloaded attachments.
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A message leaving the system toward a chat channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub chat_id: String,
    pub content: String,
    /// Part of a streamed response; channels without live edits buffer these.
    #[serde(default)]
    pub is_stream_chunk: bool,
    /// Terminates a streamed response and flushes any buffer.
    #[serde(default)]
    pub is_stream_end: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OutboundMessage {
    pub fn text(channel: Channel, chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel,
            chat_id: chat_id.into(),
            content: content.into(),
            is_stream_chunk: false,
            is_stream_end: false,
            metadata: HashMap::new(),
        }
    }

    pub fn stream_chunk(
        channel: Channel,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            is_stream_chunk: true,
            ..Self::text(channel, chat_id, content)
        }
    }

    pub fn stream_end(channel: Channel, chat_id: impl Into<String>) -> Self {
        Self {
            is_stream_end: true,
            ..Self::text(channel, chat_id, "")
        }
    }
}

/// System telemetry events fanned out to dashboard subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl SystemEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: chrono::Utc::now(),
        }
    }
}
