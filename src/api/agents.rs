//! Mission Control agent endpoints.

use super::state::{ApiState, error_response};
use crate::mission_control::models::AgentProfile;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct CreateAgentRequest {
    name: String,
    role: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    specialties: Vec<String>,
    #[serde(default)]
    backend: Option<String>,
}

pub(super) async fn list_agents(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let agents = state.manager.list_agents().await;
    let count = agents.len();
    Ok(Json(json!({ "agents": agents, "count": count })))
}

pub(super) async fn create_agent(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateAgentRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let mut agent = AgentProfile::new(request.name, request.role);
    agent.description = request.description.unwrap_or_default();
    agent.specialties = request.specialties;
    agent.backend = request
        .backend
        .unwrap_or_else(|| state.settings.agent_backend.clone());

    let agent = state
        .manager
        .create_agent(agent)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "agent": agent })))
}

pub(super) async fn delete_agent(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let deleted = state
        .manager
        .delete_agent(&agent_id)
        .await
        .map_err(error_response)?;
    if !deleted {
        return Err((StatusCode::NOT_FOUND, "Agent not found".into()));
    }
    Ok(Json(json!({ "success": true })))
}
