//! WhatsApp channel adapter (Business Cloud API).
//!
//! Inbound messages arrive via Meta webhooks; the HTTP layer hands the raw
//! payload to [`WhatsAppAdapter::handle_webhook_message`]. Outbound text is
//! posted to the Cloud API. WhatsApp has no live message edits, so streamed
//! chunks are buffered per chat and flushed on `is_stream_end`.

use crate::bus::adapters::{ChannelAdapter, spawn_outbound_loop};
use crate::bus::events::{Channel, InboundMessage, OutboundMessage};
use crate::bus::format::convert_markdown;
use crate::bus::media::{MediaDownloader, build_media_hint};
use crate::bus::queue::MessageBus;
use crate::error::Result;
use anyhow::Context as _;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const WHATSAPP_API_VERSION: &str = "v21.0";

fn api_base() -> String {
    format!("https://graph.facebook.com/{WHATSAPP_API_VERSION}")
}

/// Adapter for the WhatsApp Business Cloud API.
pub struct WhatsAppAdapter {
    access_token: String,
    phone_number_id: String,
    verify_token: String,
    allowed_phone_numbers: Vec<String>,
    media: Arc<MediaDownloader>,
    http: reqwest::Client,
    bus: Mutex<Option<MessageBus>>,
    buffers: Mutex<HashMap<String, String>>,
    outbound_loop: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WhatsAppAdapter {
    pub fn new(
        access_token: String,
        phone_number_id: String,
        verify_token: String,
        allowed_phone_numbers: Vec<String>,
        media: Arc<MediaDownloader>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build WhatsApp HTTP client")?;

        Ok(Self {
            access_token,
            phone_number_id,
            verify_token,
            allowed_phone_numbers,
            media,
            http,
            bus: Mutex::new(None),
            buffers: Mutex::new(HashMap::new()),
            outbound_loop: Mutex::new(None),
        })
    }

    /// Handle the Meta webhook verification challenge.
    ///
    /// Returns the challenge string on success, `None` on failure.
    pub fn handle_webhook_verify(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&str>,
    ) -> Option<String> {
        if mode == Some("subscribe") && token == Some(self.verify_token.as_str()) {
            challenge.map(|c| c.to_string())
        } else {
            None
        }
    }

    /// Parse an incoming webhook payload and publish inbound messages.
    pub async fn handle_webhook_message(&self, payload: &serde_json::Value) {
        let entries = payload["entry"].as_array().cloned().unwrap_or_default();
        for entry in entries {
            let changes = entry["changes"].as_array().cloned().unwrap_or_default();
            for change in changes {
                let messages = change["value"]["messages"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default();
                for msg_data in messages {
                    if let Err(error) = self.handle_one_message(&msg_data).await {
                        tracing::warn!(%error, "failed to process WhatsApp message");
                    }
                }
            }
        }
    }

    async fn handle_one_message(&self, msg_data: &serde_json::Value) -> Result<()> {
        let sender = msg_data["from"].as_str().unwrap_or_default().to_string();

        if !self.allowed_phone_numbers.is_empty()
            && !self.allowed_phone_numbers.contains(&sender)
        {
            tracing::debug!(%sender, "WhatsApp message from unauthorized number");
            return Ok(());
        }

        let (content, media_paths) = self.extract_content_and_media(msg_data).await;
        if content.is_empty() && media_paths.is_empty() {
            return Ok(());
        }

        let mut metadata = HashMap::new();
        metadata.insert(
            "message_id".to_string(),
            msg_data["id"].clone(),
        );
        metadata.insert(
            "message_type".to_string(),
            msg_data["type"].clone(),
        );

        let message = InboundMessage {
            channel: Channel::Whatsapp,
            sender_id: sender.clone(),
            chat_id: sender,
            content,
            media: media_paths,
            metadata,
        };

        if let Some(bus) = self.bus.lock().await.as_ref() {
            bus.publish_inbound(message);
        }

        if let Some(message_id) = msg_data["id"].as_str() {
            self.mark_as_read(message_id);
        }

        Ok(())
    }

    /// Extract text content and download media from a WhatsApp message.
    async fn extract_content_and_media(
        &self,
        msg_data: &serde_json::Value,
    ) -> (String, Vec<String>) {
        let msg_type = msg_data["type"].as_str().unwrap_or("text");

        if msg_type == "text" {
            let body = msg_data["text"]["body"].as_str().unwrap_or_default();
            return (body.to_string(), Vec::new());
        }

        // Media types carry a caption and a media id under a key matching
        // the message type.
        if matches!(msg_type, "image" | "document" | "audio" | "video" | "sticker") {
            let media_block = &msg_data[msg_type];
            let mut caption = media_block["caption"].as_str().unwrap_or_default().to_string();
            let media_id = media_block["id"].as_str();
            let mime = media_block["mime_type"].as_str();
            let filename = media_block["filename"]
                .as_str()
                .map(|f| f.to_string())
                .unwrap_or_else(|| msg_type.to_string());

            let mut media_paths = Vec::new();
            if let Some(media_id) = media_id {
                match self.download_media(media_id, &filename, mime).await {
                    Ok(path) => {
                        media_paths.push(path);
                        caption.push_str(&build_media_hint(&[filename]));
                    }
                    Err(error) => {
                        tracing::warn!(%error, "failed to download WhatsApp media");
                    }
                }
            }

            let content = if caption.is_empty() {
                format!("[{msg_type} received]")
            } else {
                caption
            };
            return (content, media_paths);
        }

        (format!("[{msg_type} message received]"), Vec::new())
    }

    /// Two-step WhatsApp media download: resolve the media id to a URL, then
    /// fetch the URL with the same bearer token.
    async fn download_media(&self, media_id: &str, name: &str, mime: Option<&str>) -> Result<String> {
        let url_response = self
            .http
            .get(format!("{}/{media_id}", api_base()))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("WhatsApp media URL fetch failed")?
            .error_for_status()
            .context("WhatsApp media URL fetch rejected")?;

        let body: serde_json::Value = url_response
            .json()
            .await
            .context("WhatsApp media URL response was not JSON")?;
        let media_url = body["url"]
            .as_str()
            .context("WhatsApp media URL response missing url")?;

        self.media
            .download_url_with_auth(
                media_url,
                &format!("Bearer {}", self.access_token),
                Some(name),
                mime,
            )
            .await
    }

    /// Send a read receipt for a message, off the webhook path.
    /// Failures are logged only.
    fn mark_as_read(&self, message_id: &str) {
        let url = format!("{}/{}/messages", api_base(), self.phone_number_id);
        let request = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "messaging_product": "whatsapp",
                "status": "read",
                "message_id": message_id,
            }));
        tokio::spawn(async move {
            if let Err(error) = request.send().await {
                tracing::debug!(%error, "failed to send WhatsApp read receipt");
            }
        });
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let text = convert_markdown(text, Channel::Whatsapp);
        let url = format!("{}/{}/messages", api_base(), self.phone_number_id);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": { "body": text },
            }))
            .send()
            .await
            .context("WhatsApp send failed")?;

        if response.status().is_client_error() || response.status().is_server_error() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "WhatsApp API error");
        }
        Ok(())
    }
}

impl ChannelAdapter for WhatsAppAdapter {
    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    async fn start(&self, bus: &MessageBus) -> Result<()> {
        *self.bus.lock().await = Some(bus.clone());
        tracing::info!("WhatsApp adapter started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(handle) = self.outbound_loop.lock().await.take() {
            handle.abort();
        }

        // Flush any half-streamed responses before shutting down.
        let pending: Vec<(String, String)> = self.buffers.lock().await.drain().collect();
        for (chat_id, text) in pending {
            if !text.trim().is_empty() {
                let _ = self.send_text(&chat_id, &text).await;
            }
        }

        *self.bus.lock().await = None;
        tracing::info!("WhatsApp adapter stopped");
        Ok(())
    }

    async fn send(&self, message: OutboundMessage) -> Result<()> {
        if message.is_stream_chunk {
            let mut buffers = self.buffers.lock().await;
            buffers
                .entry(message.chat_id)
                .or_default()
                .push_str(&message.content);
            return Ok(());
        }

        if message.is_stream_end {
            let text = self.buffers.lock().await.remove(&message.chat_id);
            if let Some(text) = text
                && !text.trim().is_empty()
            {
                self.send_text(&message.chat_id, &text).await?;
            }
            return Ok(());
        }

        if !message.content.trim().is_empty() {
            self.send_text(&message.chat_id, &message.content).await?;
        }
        Ok(())
    }
}

/// Wire the adapter's outbound loop onto the bus after `start`.
pub async fn attach_outbound(adapter: &Arc<WhatsAppAdapter>, bus: &MessageBus) {
    let handle = spawn_outbound_loop(adapter.clone(), bus);
    *adapter.outbound_loop.lock().await = Some(handle);
}
