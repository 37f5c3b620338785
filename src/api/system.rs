//! System endpoints: health, activity feed, file browser, dashboard
//! WebSocket, and the WhatsApp webhook.

use super::state::ApiState;
use crate::bus::events::{Channel, InboundMessage};

use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Maximum entries returned by the file browser.
const BROWSE_LIMIT: usize = 50;

pub(super) async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Deserialize)]
pub(super) struct ActivityQuery {
    #[serde(default = "default_activity_limit")]
    limit: usize,
}

fn default_activity_limit() -> usize {
    50
}

pub(super) async fn activity_feed(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ActivityQuery>,
) -> Json<serde_json::Value> {
    let activities = state.manager.get_activity_feed(query.limit.min(500)).await;
    Json(json!({ "activities": activities }))
}

// File browser

#[derive(Debug, Serialize, PartialEq)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
}

#[derive(Deserialize)]
pub(super) struct BrowseQuery {
    path: String,
}

/// List up to [`BROWSE_LIMIT`] visible entries of a directory, sorted by
/// name. Hidden entries are filtered out before the cap is applied, so a
/// directory full of dot-files still shows its visible children.
pub fn list_visible_entries(dir: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut entries: Vec<FileEntry> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                return None;
            }
            let is_dir = entry.file_type().ok()?.is_dir();
            Some(FileEntry {
                path: entry.path().display().to_string(),
                name,
                is_dir,
            })
        })
        .collect();

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries.truncate(BROWSE_LIMIT);
    Ok(entries)
}

pub(super) async fn browse_files(
    Query(query): Query<BrowseQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let dir = std::path::PathBuf::from(&query.path);
    if !dir.is_dir() {
        return Err((StatusCode::NOT_FOUND, "Not a directory".into()));
    }

    let files = list_visible_entries(&dir)
        .map_err(|error| (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()))?;
    Ok(Json(json!({ "path": query.path, "files": files })))
}

// Dashboard WebSocket

pub(super) async fn dashboard_ws(
    State(state): State<Arc<ApiState>>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_dashboard_socket(socket, state))
}

/// One dashboard connection: bus events flow out as JSON; text frames from
/// the browser become inbound web-channel messages.
async fn handle_dashboard_socket(mut socket: WebSocket, state: Arc<ApiState>) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut events = state.web_adapter.register_session(&session_id).await;
    tracing::info!(%session_id, "dashboard connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        state.bus.publish_inbound(InboundMessage {
                            channel: Channel::Web,
                            sender_id: "dashboard".into(),
                            chat_id: session_id.clone(),
                            content: text.to_string(),
                            media: Vec::new(),
                            metadata: Default::default(),
                        });
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::debug!(%error, %session_id, "dashboard socket error");
                        break;
                    }
                }
            }
        }
    }

    state.web_adapter.unregister_session(&session_id).await;
    tracing::info!(%session_id, "dashboard disconnected");
}

// WhatsApp webhook

#[derive(Deserialize)]
pub(super) struct WhatsAppVerifyQuery {
    #[serde(rename = "hub.mode", default)]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token", default)]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge", default)]
    challenge: Option<String>,
}

pub(super) async fn whatsapp_verify(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<WhatsAppVerifyQuery>,
) -> Result<String, StatusCode> {
    let Some(adapter) = &state.whatsapp else {
        return Err(StatusCode::NOT_FOUND);
    };
    adapter
        .handle_webhook_verify(
            query.mode.as_deref(),
            query.verify_token.as_deref(),
            query.challenge.as_deref(),
        )
        .ok_or(StatusCode::FORBIDDEN)
}

pub(super) async fn whatsapp_webhook(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Some(adapter) = &state.whatsapp else {
        return Err(StatusCode::NOT_FOUND);
    };
    adapter.handle_webhook_message(&payload).await;
    Ok(Json(json!({ "status": "received" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_heavy_directory_still_lists_visible_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        for i in 0..55 {
            std::fs::create_dir(dir.path().join(format!(".hidden_dir_{i:02}"))).expect("mkdir");
        }
        let visible = ["Applications", "Desktop", "Documents", "Downloads", "Music"];
        for name in visible {
            std::fs::create_dir(dir.path().join(name)).expect("mkdir");
        }

        let entries = list_visible_entries(dir.path()).expect("list");
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();

        assert_eq!(names, visible, "visible dirs, sorted, no dot-names");
    }

    #[test]
    fn hidden_entries_never_appear() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(".gitconfig"), "config").expect("write");
        std::fs::create_dir(dir.path().join(".ssh")).expect("mkdir");
        std::fs::create_dir(dir.path().join("Documents")).expect("mkdir");
        std::fs::write(dir.path().join("visible_file.txt"), "data").expect("write");

        let entries = list_visible_entries(dir.path()).expect("list");
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();

        assert!(!names.contains(&".gitconfig"));
        assert!(!names.contains(&".ssh"));
        assert!(names.contains(&"Documents"));
        assert!(names.contains(&"visible_file.txt"));
    }

    #[test]
    fn limit_applies_to_visible_items_not_raw_items() {
        let dir = tempfile::tempdir().expect("tempdir");
        for i in 0..30 {
            std::fs::create_dir(dir.path().join(format!(".hidden_{i:02}"))).expect("mkdir");
        }
        for i in 0..60 {
            std::fs::create_dir(dir.path().join(format!("visible_dir_{i:02}"))).expect("mkdir");
        }

        let entries = list_visible_entries(dir.path()).expect("list");
        assert_eq!(entries.len(), BROWSE_LIMIT, "cap counts visible items only");
    }

    #[test]
    fn mixed_files_and_dirs_are_typed() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("adir")).expect("mkdir");
        std::fs::write(dir.path().join("afile.txt"), "x").expect("write");

        let entries = list_visible_entries(dir.path()).expect("list");
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().find(|e| e.name == "adir").expect("dir").is_dir);
        assert!(!entries.iter().find(|e| e.name == "afile.txt").expect("file").is_dir);
    }
}
