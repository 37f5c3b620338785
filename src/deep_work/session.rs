//! Deep Work session: planner → store → approval → scheduler handoff.

use crate::deep_work::planner::{PlanOutput, PlanRequest, Planner};
use crate::deep_work::scheduler::DependencyScheduler;
use crate::error::{Result, StoreError, ValidationError};
use crate::mission_control::executor::TaskExecutor;
use crate::mission_control::manager::MissionControlManager;
use crate::mission_control::models::{
    AgentProfile, Document, DocumentType, Project, ProjectStatus, Task, TaskStatus,
};
use std::sync::Arc;

/// Accepted research depths, case-sensitive.
pub const VALID_RESEARCH_DEPTHS: [&str; 4] = ["none", "quick", "standard", "deep"];

const MIN_DESCRIPTION_LEN: usize = 10;
const MAX_DESCRIPTION_LEN: usize = 5000;

/// Externally-facing Deep Work verbs.
pub struct DeepWorkSession {
    manager: Arc<MissionControlManager>,
    scheduler: Arc<DependencyScheduler>,
    executor: Arc<TaskExecutor>,
    planner: Arc<dyn Planner>,
    default_backend: String,
}

impl DeepWorkSession {
    pub fn new(
        manager: Arc<MissionControlManager>,
        scheduler: Arc<DependencyScheduler>,
        executor: Arc<TaskExecutor>,
        planner: Arc<dyn Planner>,
        default_backend: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            scheduler,
            executor,
            planner,
            default_backend: default_backend.into(),
        }
    }

    pub fn scheduler(&self) -> &Arc<DependencyScheduler> {
        &self.scheduler
    }

    /// Submit a new project: create it awaiting approval, run the planner,
    /// and materialize the plan into the store.
    pub async fn start(&self, description: &str) -> Result<Project> {
        let length = description.chars().count();
        if length < MIN_DESCRIPTION_LEN {
            return Err(ValidationError::TooShort {
                field: "description",
                actual: length,
                min: MIN_DESCRIPTION_LEN,
            }
            .into());
        }
        if length > MAX_DESCRIPTION_LEN {
            return Err(ValidationError::TooLong {
                field: "description",
                actual: length,
                max: MAX_DESCRIPTION_LEN,
            }
            .into());
        }

        let title: String = description.chars().take(60).collect();
        let mut project = self
            .manager
            .create_project(title, description, Vec::new(), "deep_work")
            .await?;
        project.status = ProjectStatus::AwaitingApproval;
        self.manager.update_project(&mut project).await?;

        let output = self
            .planner
            .plan(PlanRequest {
                project_id: project.id.clone(),
                description: description.to_string(),
                research_depth: "standard".to_string(),
            })
            .await?;
        self.materialize_plan(&mut project, output).await?;

        Ok(project)
    }

    /// Re-plan an existing project from new user input.
    pub async fn plan_existing_project(
        &self,
        project_id: &str,
        user_input: &str,
        research_depth: &str,
    ) -> Result<Project> {
        if user_input.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "user_input",
            }
            .into());
        }
        let length = user_input.chars().count();
        if length > MAX_DESCRIPTION_LEN {
            return Err(ValidationError::TooLong {
                field: "user_input",
                actual: length,
                max: MAX_DESCRIPTION_LEN,
            }
            .into());
        }
        if !VALID_RESEARCH_DEPTHS.contains(&research_depth) {
            return Err(ValidationError::InvalidResearchDepth {
                value: research_depth.to_string(),
                valid: &VALID_RESEARCH_DEPTHS,
            }
            .into());
        }

        let mut project = self.require_project(project_id).await?;

        let output = self
            .planner
            .plan(PlanRequest {
                project_id: project.id.clone(),
                description: user_input.to_string(),
                research_depth: research_depth.to_string(),
            })
            .await?;
        self.materialize_plan(&mut project, output).await?;
        project.status = ProjectStatus::AwaitingApproval;
        self.manager.update_project(&mut project).await?;

        Ok(project)
    }

    /// Approve a plan: validate the dependency graph, register the cascade
    /// callback on the executor, and kick the first dispatch.
    pub async fn approve(&self, project_id: &str) -> Result<Project> {
        let project = self.require_project(project_id).await?;

        let tasks = self.manager.get_project_tasks(&project.id).await;
        DependencyScheduler::validate_graph(&tasks)?;

        let project = self
            .manager
            .set_project_status(project_id, ProjectStatus::Approved)
            .await?;

        let scheduler = self.scheduler.clone();
        self.executor.set_on_task_done(Arc::new(move |task_id| {
            let scheduler = scheduler.clone();
            Box::pin(async move {
                scheduler.on_task_completed(&task_id).await;
            })
        }));

        self.scheduler.dispatch(project_id).await;

        // Dispatch may already have advanced the status.
        Ok(self
            .manager
            .get_project(project_id)
            .await
            .unwrap_or(project))
    }

    /// Pause execution. In-flight tasks keep running; no new dispatches.
    pub async fn pause(&self, project_id: &str) -> Result<Project> {
        self.require_project(project_id).await?;
        self.manager
            .set_project_status(project_id, ProjectStatus::Paused)
            .await
    }

    /// Resume a paused project and re-invoke the dispatcher.
    pub async fn resume(&self, project_id: &str) -> Result<Project> {
        self.require_project(project_id).await?;
        let project = self
            .manager
            .set_project_status(project_id, ProjectStatus::Executing)
            .await?;
        self.scheduler.dispatch(project_id).await;
        Ok(project)
    }

    /// Create agents, tasks with symmetric dependency edges, and the PRD
    /// document from a plan.
    async fn materialize_plan(&self, project: &mut Project, output: PlanOutput) -> Result<()> {
        let mut agent_ids = Vec::with_capacity(output.agents.len());
        for planned in &output.agents {
            let mut agent = AgentProfile::new(&planned.name, &planned.role);
            agent.description = planned.description.clone();
            agent.specialties = planned.specialties.clone();
            agent.backend = if planned.backend.is_empty() {
                self.default_backend.clone()
            } else {
                planned.backend.clone()
            };
            let agent = self.manager.create_agent(agent).await?;
            agent_ids.push(agent.id);
        }

        let mut task_ids = Vec::with_capacity(output.tasks.len());
        for planned in &output.tasks {
            let mut task = Task::new(&planned.title);
            task.description = planned.description.clone();
            task.priority = planned.priority;
            task.task_type = planned.task_type;
            task.estimated_minutes = planned.estimated_minutes;
            task.project_id = Some(project.id.clone());
            task.creator_id = "deep_work".into();
            task.status = TaskStatus::Inbox;
            if let Some(assignee) = planned.assignee
                && let Some(agent_id) = agent_ids.get(assignee)
            {
                task.assignee_ids = vec![agent_id.clone()];
            }
            let task = self.manager.create_task(task).await?;
            task_ids.push(task.id);
        }

        for (index, planned) in output.tasks.iter().enumerate() {
            for dep_index in &planned.depends_on {
                let (Some(blocker), Some(blocked)) =
                    (task_ids.get(*dep_index), task_ids.get(index))
                else {
                    tracing::warn!(
                        task_index = index,
                        dep_index,
                        "planner referenced an out-of-range task, skipping edge"
                    );
                    continue;
                };
                self.manager.link_dependency(blocker, blocked).await?;
            }
        }

        if !output.prd_markdown.is_empty() {
            let mut prd = Document::new(
                format!("PRD: {}", project.title),
                output.prd_markdown,
                DocumentType::Prd,
            );
            prd.project_id = Some(project.id.clone());
            prd.author_id = "deep_work".into();
            self.manager.save_document(&prd).await?;
            project.prd_document_id = Some(prd.id);
            self.manager.update_project(project).await?;
        }

        Ok(())
    }

    async fn require_project(&self, project_id: &str) -> Result<Project> {
        self.manager
            .get_project(project_id)
            .await
            .ok_or_else(|| {
                StoreError::NotFound {
                    kind: "project",
                    id: project_id.to_string(),
                }
                .into()
            })
    }
}
