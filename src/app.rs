//! Application container: explicit wiring of every subsystem.
//!
//! There is no module-global state; the container owns the store, bus,
//! manager, executor, scheduler, and session, and hands out shared handles.
//! Tests build a fresh container (or the subsystems directly) per case;
//! production wires one at startup.

use crate::agents::backend::BackendRegistry;
use crate::api::ApiState;
use crate::bus::adapters::ChannelAdapter as _;
use crate::bus::adapters::web::{self, WebDashboardAdapter};
use crate::bus::adapters::whatsapp::{self, WhatsAppAdapter};
use crate::bus::media::MediaDownloader;
use crate::bus::queue::MessageBus;
use crate::config::Settings;
use crate::deep_work::planner::{FallbackPlanner, Planner};
use crate::deep_work::scheduler::{DependencyScheduler, NotificationHumanTaskNotifier};
use crate::deep_work::session::DeepWorkSession;
use crate::error::Result;
use crate::mission_control::executor::TaskExecutor;
use crate::mission_control::manager::MissionControlManager;
use crate::mission_control::store::FileMissionControlStore;
use std::sync::Arc;

pub struct App {
    pub settings: Arc<Settings>,
    pub bus: MessageBus,
    pub store: Arc<FileMissionControlStore>,
    pub manager: Arc<MissionControlManager>,
    pub executor: Arc<TaskExecutor>,
    pub scheduler: Arc<DependencyScheduler>,
    pub session: Arc<DeepWorkSession>,
    pub media: Arc<MediaDownloader>,
    pub web_adapter: Arc<WebDashboardAdapter>,
    pub whatsapp: Option<Arc<WhatsAppAdapter>>,
}

impl App {
    /// Wire a container with the default (empty) backend registry and the
    /// fallback planner. Embedders use [`App::build`] to inject real LLM
    /// backends and a real planning pipeline.
    pub fn new(settings: Settings) -> Result<Self> {
        Self::build(settings, BackendRegistry::new(), Arc::new(FallbackPlanner))
    }

    pub fn build(
        settings: Settings,
        backends: BackendRegistry,
        planner: Arc<dyn Planner>,
    ) -> Result<Self> {
        let settings = Arc::new(settings);
        let store = Arc::new(FileMissionControlStore::open(&settings.config_dir)?);
        let bus = MessageBus::new();
        let manager = Arc::new(MissionControlManager::new(store.clone(), bus.clone()));
        let media = Arc::new(MediaDownloader::new(
            settings.media_dir()?,
            settings.media_max_file_size_mb,
        ));

        let executor = Arc::new(TaskExecutor::new(
            manager.clone(),
            bus.clone(),
            settings.clone(),
            Arc::new(backends),
        ));
        let scheduler = Arc::new(DependencyScheduler::new(
            manager.clone(),
            Arc::downgrade(&executor),
            Arc::new(NotificationHumanTaskNotifier::new(manager.clone())),
        ));
        let session = Arc::new(DeepWorkSession::new(
            manager.clone(),
            scheduler.clone(),
            executor.clone(),
            planner,
            settings.agent_backend.clone(),
        ));

        // WhatsApp is constructed only when its credentials are present;
        // the CLI turns a missing credential into a startup error.
        let whatsapp = match (
            settings.whatsapp_access_token.clone(),
            settings.whatsapp_phone_number_id.clone(),
        ) {
            (Some(access_token), Some(phone_number_id)) => Some(Arc::new(WhatsAppAdapter::new(
                access_token,
                phone_number_id,
                settings.whatsapp_verify_token.clone().unwrap_or_default(),
                settings.whatsapp_allowed_phone_numbers.clone(),
                media.clone(),
            )?)),
            _ => None,
        };

        Ok(Self {
            settings,
            bus,
            store,
            manager,
            executor,
            scheduler,
            session,
            media,
            web_adapter: Arc::new(WebDashboardAdapter::new()),
            whatsapp,
        })
    }

    /// Start the dashboard adapter plus any explicitly requested channels.
    ///
    /// Channels whose transports live outside this process (Telegram,
    /// Discord, Slack bridges) are validated for configuration and left to
    /// their bridges; WhatsApp runs in-process off the webhook.
    pub async fn start_channels(&self, channels: &[String]) -> Result<()> {
        self.web_adapter.start(&self.bus).await?;
        web::attach_outbound(&self.web_adapter, &self.bus).await;

        for channel in channels {
            self.settings.require_channel(channel)?;
            match channel.as_str() {
                "whatsapp" => {
                    let adapter = self
                        .whatsapp
                        .as_ref()
                        .expect("require_channel verified whatsapp credentials");
                    adapter.start(&self.bus).await?;
                    whatsapp::attach_outbound(adapter, &self.bus).await;
                }
                other => {
                    tracing::info!(
                        channel = other,
                        "channel transport runs in its external bridge; bus events are live"
                    );
                }
            }
        }
        Ok(())
    }

    /// Stop adapters and drain their buffers.
    pub async fn shutdown(&self) {
        if let Some(whatsapp) = &self.whatsapp {
            if let Err(error) = whatsapp.stop().await {
                tracing::warn!(%error, "whatsapp adapter shutdown failed");
            }
        }
        if let Err(error) = self.web_adapter.stop().await {
            tracing::warn!(%error, "web adapter shutdown failed");
        }
        self.media.close().await;
    }

    pub fn api_state(&self) -> Arc<ApiState> {
        Arc::new(ApiState {
            settings: self.settings.clone(),
            bus: self.bus.clone(),
            manager: self.manager.clone(),
            executor: self.executor.clone(),
            session: self.session.clone(),
            web_adapter: self.web_adapter.clone(),
            whatsapp: self.whatsapp.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn container_wires_a_working_stack() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = App::new(Settings::for_dir(dir.path())).expect("app builds");

        let project = app
            .manager
            .create_project("Wired", "", Vec::new(), "test")
            .await
            .expect("manager works");
        assert!(app.manager.get_project(&project.id).await.is_some());
        assert!(app.whatsapp.is_none(), "no whatsapp creds configured");
    }

    #[tokio::test]
    async fn unconfigured_channel_is_a_startup_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = App::new(Settings::for_dir(dir.path())).expect("app builds");

        let error = app
            .start_channels(&["whatsapp".to_string()])
            .await
            .expect_err("missing whatsapp creds must fail at startup");
        assert!(error.to_string().contains("not configured"));
    }
}
