//! Mission Control project endpoints.

use super::state::{ApiState, error_response};
use crate::error::ValidationError;
use crate::mission_control::models::ProjectStatus;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct CreateProjectRequest {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub(super) struct ListProjectsQuery {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct UpdateProjectRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    status: Option<String>,
}

pub(super) async fn create_project(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let project = state
        .manager
        .create_project(
            request.title,
            request.description.unwrap_or_default(),
            request.tags.unwrap_or_default(),
            "api",
        )
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "project": project })))
}

pub(super) async fn list_projects(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ListProjectsQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let status = match query.status.as_deref() {
        None => None,
        Some(value) => Some(ProjectStatus::parse(value).ok_or_else(|| {
            error_response(
                ValidationError::InvalidEnum {
                    field: "status",
                    value: value.to_string(),
                }
                .into(),
            )
        })?),
    };

    let projects = state.manager.list_projects(status).await;
    let count = projects.len();
    Ok(Json(json!({ "projects": projects, "count": count })))
}

pub(super) async fn get_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let Some(project) = state.manager.get_project(&project_id).await else {
        return Err((StatusCode::NOT_FOUND, "Project not found".into()));
    };
    Ok(Json(json!({ "project": project })))
}

pub(super) async fn update_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
    Json(request): Json<UpdateProjectRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let Some(mut project) = state.manager.get_project(&project_id).await else {
        return Err((StatusCode::NOT_FOUND, "Project not found".into()));
    };

    if let Some(status) = request.status.as_deref() {
        project.status = ProjectStatus::parse(status).ok_or_else(|| {
            error_response(
                ValidationError::InvalidEnum {
                    field: "status",
                    value: status.to_string(),
                }
                .into(),
            )
        })?;
    }
    if let Some(title) = request.title {
        project.title = title;
    }
    if let Some(description) = request.description {
        project.description = description;
    }
    if let Some(tags) = request.tags {
        project.tags = tags;
    }

    state
        .manager
        .update_project(&mut project)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "project": project })))
}

pub(super) async fn delete_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let deleted = state
        .manager
        .delete_project(&project_id)
        .await
        .map_err(error_response)?;
    if !deleted {
        return Err((StatusCode::NOT_FOUND, "Project not found".into()));
    }
    Ok(Json(json!({ "success": true })))
}

pub(super) async fn approve_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let project = state
        .session
        .approve(&project_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "project": project })))
}

pub(super) async fn pause_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let project = state
        .session
        .pause(&project_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "project": project })))
}

pub(super) async fn resume_project(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let project = state
        .session
        .resume(&project_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "project": project })))
}
