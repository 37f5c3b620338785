//! Planner contract.
//!
//! The planning pipeline (research, PRD, task graph, team) runs on LLMs
//! outside this crate. To Deep Work it is a pure function from a project
//! description to a plan; the session materializes the plan into the store.

use crate::error::Result;
use crate::mission_control::models::{TaskPriority, TaskType};

/// Input to one planning run.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub project_id: String,
    pub description: String,
    /// One of `none`, `quick`, `standard`, `deep`. Validated by the session.
    pub research_depth: String,
}

/// A task proposed by the planner. Dependencies and the assignee reference
/// other plan entries by index; the session resolves them to store ids.
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub task_type: TaskType,
    pub estimated_minutes: Option<u32>,
    /// Indices into `PlanOutput::tasks` that must finish first.
    pub depends_on: Vec<usize>,
    /// Index into `PlanOutput::agents` of the assigned agent.
    pub assignee: Option<usize>,
}

/// An agent profile proposed by the planner.
#[derive(Debug, Clone)]
pub struct PlannedAgent {
    pub name: String,
    pub role: String,
    pub description: String,
    pub specialties: Vec<String>,
    /// Backend name; empty means the configured default.
    pub backend: String,
}

/// The complete output of one planning run.
#[derive(Debug, Clone)]
pub struct PlanOutput {
    pub tasks: Vec<PlannedTask>,
    pub agents: Vec<PlannedAgent>,
    pub prd_markdown: String,
}

/// The planning pipeline, treated as a pure async function.
#[async_trait::async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: PlanRequest) -> Result<PlanOutput>;
}

/// Degenerate plan used when no LLM planning pipeline has been wired:
/// one generalist agent and a single task carrying the whole description.
/// Keeps the host usable end-to-end without a planner integration.
pub struct FallbackPlanner;

#[async_trait::async_trait]
impl Planner for FallbackPlanner {
    async fn plan(&self, request: PlanRequest) -> Result<PlanOutput> {
        tracing::warn!(
            project_id = %request.project_id,
            "no planner configured; producing a single-task plan"
        );

        let title: String = request.description.chars().take(80).collect();
        Ok(PlanOutput {
            tasks: vec![PlannedTask {
                title,
                description: request.description.clone(),
                priority: TaskPriority::Medium,
                task_type: TaskType::Agent,
                estimated_minutes: None,
                depends_on: Vec::new(),
                assignee: Some(0),
            }],
            agents: vec![PlannedAgent {
                name: "Scout".into(),
                role: "Generalist".into(),
                description: "Handles unplanned projects end to end".into(),
                specialties: Vec::new(),
                backend: String::new(),
            }],
            prd_markdown: format!("# Request\n\n{}", request.description),
        })
    }
}
