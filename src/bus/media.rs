//! Media download utility for channel adapters.
//!
//! Downloads incoming media (images, documents, audio, video) to the local
//! media directory and returns file paths for `InboundMessage::media`.

use crate::error::{ChannelError, Result};
use anyhow::Context as _;
use sha2::{Digest as _, Sha256};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// HTTP timeout for media fetches.
const DOWNLOAD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Remove unsafe characters from a filename, keeping the extension.
pub fn sanitize_filename(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for ch in name.chars() {
        let keep = ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' || ch == '_';
        let ch = if keep { ch } else { '_' };
        if ch == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        sanitized.push(ch);
    }
    let sanitized = sanitized.trim_matches('_');
    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized.to_string()
    }
}

/// Generate a collision-free filename: `{time_ms_hex}_{hash8}_{sanitized}`.
///
/// When the sanitized name carries no extension, one is guessed from the
/// MIME type.
pub fn unique_filename(name: &str, mime: Option<&str>) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let ts_hex = format!("{:x}", now.as_millis());

    let mut hasher = Sha256::new();
    hasher.update(now.as_nanos().to_le_bytes());
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let hash8: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    let mut sanitized = sanitize_filename(name);
    if !sanitized.contains('.')
        && let Some(mime) = mime
        && let Some(ext) = mime_guess::get_mime_extensions_str(mime).and_then(|e| e.first().copied())
    {
        sanitized.push('.');
        sanitized.push_str(ext);
    }

    format!("{ts_hex}_{hash8}_{sanitized}")
}

/// Build a text hint for attached media files, e.g. `"\n[Attached: photo.jpg]"`.
pub fn build_media_hint(filenames: &[String]) -> String {
    if filenames.is_empty() {
        return String::new();
    }
    format!("\n[Attached: {}]", filenames.join(", "))
}

/// Downloads and saves media files from channel messages.
///
/// One instance is shared across adapters; the HTTP client is created on
/// first use and reused for every download.
pub struct MediaDownloader {
    media_dir: PathBuf,
    max_file_size_mb: u64,
    client: Mutex<Option<reqwest::Client>>,
}

impl MediaDownloader {
    pub fn new(media_dir: impl Into<PathBuf>, max_file_size_mb: u64) -> Self {
        Self {
            media_dir: media_dir.into(),
            max_file_size_mb,
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<reqwest::Client> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("failed to build media HTTP client")?;
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Reject data over the configured size limit. 0 means unlimited.
    fn check_size(&self, data: &[u8], name: &str) -> Result<()> {
        let max_mb = self.max_file_size_mb;
        if max_mb > 0 && data.len() as u64 > max_mb * 1024 * 1024 {
            return Err(ChannelError::MediaTooLarge {
                name: name.to_string(),
                size_mb: data.len() as f64 / 1024.0 / 1024.0,
                max_mb,
            }
            .into());
        }
        Ok(())
    }

    fn write_file(&self, data: &[u8], filename: &str) -> Result<String> {
        std::fs::create_dir_all(&self.media_dir).with_context(|| {
            format!(
                "failed to create media directory: {}",
                self.media_dir.display()
            )
        })?;
        let dest = self.media_dir.join(filename);
        std::fs::write(&dest, data)
            .with_context(|| format!("failed to write media file: {}", dest.display()))?;
        Ok(dest.display().to_string())
    }

    /// Save raw bytes to disk and return the file path.
    ///
    /// Used by adapters that receive file content directly.
    pub async fn save_bytes(&self, data: &[u8], name: &str, mime: Option<&str>) -> Result<String> {
        self.check_size(data, name)?;
        let filename = unique_filename(name, mime);
        let path = self.write_file(data, &filename)?;
        tracing::info!(path = %path, bytes = data.len(), "saved media");
        Ok(path)
    }

    /// Download a URL to disk and return the file path.
    pub async fn download_url(
        &self,
        url: &str,
        name: Option<&str>,
        mime: Option<&str>,
        auth_header: Option<&str>,
    ) -> Result<String> {
        let client = self.client().await?;
        let mut request = client.get(url);
        if let Some(auth) = auth_header {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request
            .send()
            .await
            .map_err(|error| ChannelError::MediaDownload(error.to_string()))?
            .error_for_status()
            .map_err(|error| ChannelError::MediaDownload(error.to_string()))?;

        let mime = match mime {
            Some(mime) => Some(mime.to_string()),
            None => response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.split(';').next().unwrap_or("").trim().to_string())
                .filter(|value| !value.is_empty()),
        };

        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let url_path = url.split('?').next().unwrap_or(url);
                let last = url_path.rsplit('/').next().unwrap_or("");
                if last.is_empty() {
                    "download".to_string()
                } else {
                    last.to_string()
                }
            }
        };

        let data = response
            .bytes()
            .await
            .map_err(|error| ChannelError::MediaDownload(error.to_string()))?;

        self.check_size(&data, &name)?;
        let filename = unique_filename(&name, mime.as_deref());
        let path = self.write_file(&data, &filename)?;
        tracing::info!(path = %path, bytes = data.len(), url = %truncate_url(url), "downloaded media");
        Ok(path)
    }

    /// Download a URL with an `Authorization` header.
    ///
    /// Used by adapters that require auth for file downloads (Slack,
    /// WhatsApp Business).
    pub async fn download_url_with_auth(
        &self,
        url: &str,
        auth_header: &str,
        name: Option<&str>,
        mime: Option<&str>,
    ) -> Result<String> {
        self.download_url(url, name, mime, Some(auth_header)).await
    }

    /// Drop the shared HTTP client; the next download recreates it.
    pub async fn close(&self) {
        let mut guard = self.client.lock().await;
        *guard = None;
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }
}

fn truncate_url(url: &str) -> &str {
    &url[..url.len().min(80)]
}
