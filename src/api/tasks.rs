//! Mission Control task endpoints.

use super::state::{ApiState, error_response};
use crate::error::ValidationError;
use crate::mission_control::models::{Task, TaskPriority, TaskStatus, TaskType};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct CreateTaskRequest {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    task_type: Option<String>,
    #[serde(default)]
    assignee_ids: Vec<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    blocked_by: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    estimated_minutes: Option<u32>,
}

/// Status changes arrive as a JSON body, not a query string.
#[derive(Deserialize)]
pub(super) struct UpdateStatusRequest {
    status: String,
}

#[derive(Deserialize)]
pub(super) struct ExecuteTaskRequest {
    #[serde(default)]
    agent_id: Option<String>,
}

fn invalid_enum(field: &'static str, value: &str) -> (StatusCode, String) {
    error_response(
        ValidationError::InvalidEnum {
            field,
            value: value.to_string(),
        }
        .into(),
    )
}

pub(super) async fn create_task(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let priority = match request.priority.as_deref() {
        None => TaskPriority::Medium,
        Some(value) => TaskPriority::parse(value).ok_or_else(|| invalid_enum("priority", value))?,
    };
    let task_type = match request.task_type.as_deref() {
        None => TaskType::Agent,
        Some("agent") => TaskType::Agent,
        Some("human") => TaskType::Human,
        Some("review") => TaskType::Review,
        Some(value) => return Err(invalid_enum("task_type", value)),
    };

    let mut task = Task::new(request.title);
    task.description = request.description.unwrap_or_default();
    task.priority = priority;
    task.task_type = task_type;
    task.assignee_ids = request.assignee_ids;
    task.project_id = request.project_id;
    task.tags = request.tags;
    task.estimated_minutes = request.estimated_minutes;
    task.creator_id = "api".into();
    if !task.assignee_ids.is_empty() {
        task.status = TaskStatus::Assigned;
    }

    let task = state
        .manager
        .create_task(task)
        .await
        .map_err(error_response)?;

    for blocker in &request.blocked_by {
        state
            .manager
            .link_dependency(blocker, &task.id)
            .await
            .map_err(error_response)?;
    }

    let task = state
        .manager
        .get_task(&task.id)
        .await
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "task vanished".into()))?;
    Ok(Json(json!({ "task": task })))
}

pub(super) async fn get_task(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let Some(task) = state.manager.get_task(&task_id).await else {
        return Err((StatusCode::NOT_FOUND, "Task not found".into()));
    };
    Ok(Json(json!({ "task": task })))
}

pub(super) async fn update_status(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let status = TaskStatus::parse(&request.status)
        .ok_or_else(|| invalid_enum("status", &request.status))?;

    let task = state
        .manager
        .update_task_status(&task_id, status, None)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "task": task })))
}

/// Skip a task and cascade: its dependents become eligible immediately.
pub(super) async fn skip_task(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let task = state
        .manager
        .update_task_status(&task_id, TaskStatus::Skipped, None)
        .await
        .map_err(error_response)?;

    state.session.scheduler().on_task_completed(&task_id).await;

    let progress = match &task.project_id {
        Some(project_id) => Some(state.manager.get_project_progress(project_id).await),
        None => None,
    };
    Ok(Json(json!({ "task": task, "progress": progress })))
}

/// Dispatch a task directly. 409 when the executor is at capacity or the
/// task is already running.
pub(super) async fn execute_task(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
    Json(request): Json<ExecuteTaskRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let Some(task) = state.manager.get_task(&task_id).await else {
        return Err((StatusCode::NOT_FOUND, "Task not found".into()));
    };

    let agent_id = request
        .agent_id
        .or_else(|| task.assignee_ids.first().cloned())
        .ok_or((
            StatusCode::UNPROCESSABLE_ENTITY,
            "task has no assignee and no agent_id was given".to_string(),
        ))?;

    if !state.executor.execute_task_background(&task_id, &agent_id) {
        let error = if state.executor.is_task_running(&task_id) {
            crate::error::AgentError::AlreadyRunning { task_id }
        } else {
            crate::error::AgentError::CapacityExceeded {
                max: crate::mission_control::executor::MAX_CONCURRENT_TASKS,
            }
        };
        return Err(error_response(error.into()));
    }
    Ok(Json(json!({ "success": true, "task_id": task_id })))
}

pub(super) async fn stop_task(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let stopped = state.executor.stop_task(&task_id).await;
    Ok(Json(json!({ "success": true, "stopped": stopped })))
}

pub(super) async fn task_documents(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let documents = state.manager.get_task_documents(&task_id).await;
    Ok(Json(json!({ "documents": documents })))
}
