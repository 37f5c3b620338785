//! Configuration loading and validation.
//!
//! Settings come from environment variables prefixed `POCKETPAW_`.
//! The legacy `POCKETCLAW_` prefix is accepted as an alias for every key;
//! when both are set the `POCKETPAW_` value wins.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use std::path::PathBuf;

/// Default dashboard port when none is configured.
pub const DEFAULT_PORT: u16 = 8888;

/// Read an environment variable under both supported prefixes.
fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("POCKETPAW_{key}"))
        .or_else(|_| std::env::var(format!("POCKETCLAW_{key}")))
        .ok()
        .filter(|value| !value.is_empty())
}

/// PocketPaw runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for persisted state (entity files, media, projects).
    pub config_dir: PathBuf,

    /// Media download directory override. Empty means `{config_dir}/media`.
    pub media_download_dir: Option<PathBuf>,

    /// Maximum media file size in megabytes. 0 means unlimited.
    pub media_max_file_size_mb: u64,

    /// Default agent backend used when an agent profile does not name one.
    pub agent_backend: String,

    /// Preferred LLM provider for the native backend.
    pub llm_provider: String,

    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub ollama_host: String,
    pub ollama_model: String,

    /// Whether agent runs may use tools without interactive approval.
    /// Always forced true for headless task execution.
    pub bypass_permissions: bool,

    /// Channel credentials. A channel with no credentials is reported as a
    /// startup config error when explicitly requested on the CLI.
    pub telegram_bot_token: Option<String>,
    pub discord_bot_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_app_token: Option<String>,
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_phone_number_id: Option<String>,
    pub whatsapp_verify_token: Option<String>,
    pub whatsapp_allowed_phone_numbers: Vec<String>,

    /// Dashboard HTTP port.
    pub port: u16,
}

impl Settings {
    /// Load settings from the environment, creating the config directory.
    pub fn load() -> Result<Self> {
        let config_dir = match env_var("CONFIG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .map(|home| home.join(".pocketpaw"))
                .unwrap_or_else(|| PathBuf::from("./.pocketpaw")),
        };

        std::fs::create_dir_all(&config_dir).map_err(|source| ConfigError::ConfigDir {
            path: config_dir.display().to_string(),
            source,
        })?;

        let port = match env_var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid(format!("invalid port: {raw}")))?,
            None => DEFAULT_PORT,
        };

        let media_max_file_size_mb = match env_var("MEDIA_MAX_FILE_SIZE_MB") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!("invalid media_max_file_size_mb: {raw}"))
            })?,
            None => 50,
        };

        Ok(Self {
            config_dir,
            media_download_dir: env_var("MEDIA_DOWNLOAD_DIR").map(PathBuf::from),
            media_max_file_size_mb,
            agent_backend: env_var("AGENT_BACKEND").unwrap_or_else(|| "native".into()),
            llm_provider: env_var("LLM_PROVIDER").unwrap_or_else(|| "anthropic".into()),
            anthropic_api_key: env_var("ANTHROPIC_API_KEY"),
            anthropic_model: env_var("ANTHROPIC_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-20250514".into()),
            openai_api_key: env_var("OPENAI_API_KEY"),
            openai_model: env_var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".into()),
            ollama_host: env_var("OLLAMA_HOST").unwrap_or_else(|| "http://localhost:11434".into()),
            ollama_model: env_var("OLLAMA_MODEL").unwrap_or_else(|| "llama3.2".into()),
            bypass_permissions: false,
            telegram_bot_token: env_var("TELEGRAM_BOT_TOKEN"),
            discord_bot_token: env_var("DISCORD_BOT_TOKEN"),
            slack_bot_token: env_var("SLACK_BOT_TOKEN"),
            slack_app_token: env_var("SLACK_APP_TOKEN"),
            whatsapp_access_token: env_var("WHATSAPP_ACCESS_TOKEN"),
            whatsapp_phone_number_id: env_var("WHATSAPP_PHONE_NUMBER_ID"),
            whatsapp_verify_token: env_var("WHATSAPP_VERIFY_TOKEN"),
            whatsapp_allowed_phone_numbers: env_var("WHATSAPP_ALLOWED_PHONE_NUMBERS")
                .map(|raw| {
                    raw.split(',')
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            port,
        })
    }

    /// Settings rooted at an explicit directory. Used by tests.
    pub fn for_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            media_download_dir: None,
            media_max_file_size_mb: 50,
            agent_backend: "native".into(),
            llm_provider: "anthropic".into(),
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".into(),
            openai_api_key: None,
            openai_model: "gpt-4o".into(),
            ollama_host: "http://localhost:11434".into(),
            ollama_model: "llama3.2".into(),
            bypass_permissions: false,
            telegram_bot_token: None,
            discord_bot_token: None,
            slack_bot_token: None,
            slack_app_token: None,
            whatsapp_access_token: None,
            whatsapp_phone_number_id: None,
            whatsapp_verify_token: None,
            whatsapp_allowed_phone_numbers: Vec::new(),
            port: DEFAULT_PORT,
        }
    }

    /// Media storage directory, creating it if needed.
    pub fn media_dir(&self) -> Result<PathBuf> {
        let dir = self
            .media_download_dir
            .clone()
            .unwrap_or_else(|| self.config_dir.join("media"));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create media directory: {}", dir.display()))?;
        Ok(dir)
    }

    /// Working directory for a project's agents, creating it if needed.
    pub fn project_dir(&self, project_id: &str) -> Result<PathBuf> {
        let dir = self.config_dir.join("projects").join(project_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create project directory: {}", dir.display()))?;
        Ok(dir)
    }

    /// Validate that a CLI-requested channel has its credentials configured.
    ///
    /// Channels are constructed only when configured; a missing credential is
    /// a startup error rather than a deferred failure inside the adapter.
    pub fn require_channel(&self, channel: &str) -> Result<()> {
        let missing = match channel {
            "telegram" if self.telegram_bot_token.is_none() => "POCKETPAW_TELEGRAM_BOT_TOKEN",
            "discord" if self.discord_bot_token.is_none() => "POCKETPAW_DISCORD_BOT_TOKEN",
            "slack" if self.slack_bot_token.is_none() || self.slack_app_token.is_none() => {
                "POCKETPAW_SLACK_BOT_TOKEN and POCKETPAW_SLACK_APP_TOKEN"
            }
            "whatsapp"
                if self.whatsapp_access_token.is_none()
                    || self.whatsapp_phone_number_id.is_none() =>
            {
                "POCKETPAW_WHATSAPP_ACCESS_TOKEN and POCKETPAW_WHATSAPP_PHONE_NUMBER_ID"
            }
            _ => return Ok(()),
        };

        Err(ConfigError::ChannelNotConfigured {
            channel: channel.to_string(),
            missing: missing.to_string(),
        }
        .into())
    }
}
