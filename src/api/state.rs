//! Shared state handed to every API handler.

use crate::bus::adapters::web::WebDashboardAdapter;
use crate::bus::adapters::whatsapp::WhatsAppAdapter;
use crate::bus::queue::MessageBus;
use crate::config::Settings;
use crate::deep_work::session::DeepWorkSession;
use crate::error::{AgentError, Error, StoreError};
use crate::mission_control::executor::TaskExecutor;
use crate::mission_control::manager::MissionControlManager;
use axum::http::StatusCode;
use std::sync::Arc;

pub struct ApiState {
    pub settings: Arc<Settings>,
    pub bus: MessageBus,
    pub manager: Arc<MissionControlManager>,
    pub executor: Arc<TaskExecutor>,
    pub session: Arc<DeepWorkSession>,
    pub web_adapter: Arc<WebDashboardAdapter>,
    /// Present only when WhatsApp credentials are configured.
    pub whatsapp: Option<Arc<WhatsAppAdapter>>,
}

/// Map a domain error onto an HTTP response.
///
/// Validation surfaces as 422, missing entities as 404, capacity as 409;
/// everything else is a logged 500 with a generic body.
pub(super) fn error_response(error: Error) -> (StatusCode, String) {
    match &error {
        Error::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, error.to_string()),
        Error::Store(StoreError::NotFound { .. }) => (StatusCode::NOT_FOUND, error.to_string()),
        Error::Agent(AgentError::CapacityExceeded { .. })
        | Error::Agent(AgentError::AlreadyRunning { .. }) => {
            (StatusCode::CONFLICT, error.to_string())
        }
        _ => {
            tracing::error!(%error, "internal error serving API request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    }
}
