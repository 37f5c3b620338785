//! Deep Work endpoints: submit, review, approve, pause, resume.

use super::state::{ApiState, error_response};
use crate::deep_work::scheduler::DependencyScheduler;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct StartRequest {
    description: String,
}

pub(super) async fn start(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<StartRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let project = state
        .session
        .start(&request.description)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "success": true, "project": project })))
}

/// Full plan view: project, tasks, progress, PRD, and display levels.
pub(super) async fn get_plan(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let Some(project) = state.manager.get_project(&project_id).await else {
        return Err((StatusCode::NOT_FOUND, "Project not found".into()));
    };

    let tasks = state.manager.get_project_tasks(&project_id).await;
    let progress = state.manager.get_project_progress(&project_id).await;

    let prd = match &project.prd_document_id {
        Some(prd_id) => state.manager.get_document(prd_id).await,
        None => None,
    };

    let (execution_levels, task_level_map) = match DependencyScheduler::compute_levels(&tasks) {
        Ok(levels) => {
            let map = DependencyScheduler::task_level_map(&levels);
            (levels, map)
        }
        Err(error) => {
            tracing::warn!(%error, %project_id, "plan has an invalid dependency graph");
            (Vec::new(), Default::default())
        }
    };

    Ok(Json(json!({
        "project": project,
        "tasks": tasks,
        "progress": progress,
        "prd": prd,
        "execution_levels": execution_levels,
        "task_level_map": task_level_map,
    })))
}

pub(super) async fn approve(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let project = state
        .session
        .approve(&project_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "success": true, "project": project })))
}

pub(super) async fn pause(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let project = state
        .session
        .pause(&project_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "success": true, "project": project })))
}

pub(super) async fn resume(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let project = state
        .session
        .resume(&project_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "success": true, "project": project })))
}
