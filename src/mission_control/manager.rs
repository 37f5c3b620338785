//! Mission Control manager: business policy over the store.
//!
//! Every status mutation persists to the store before the system event that
//! announces it, and every activity is persisted before its
//! `mc_activity_created` broadcast. Bus publish failures never fail the
//! operation that triggered them.

use crate::bus::events::SystemEvent;
use crate::bus::queue::MessageBus;
use crate::error::{Result, StoreError};
use crate::mission_control::models::{
    Activity, ActivityType, AgentProfile, AgentStatus, Document, Notification, Project,
    ProjectStatus, Task, TaskStatus, TaskType,
};
use crate::mission_control::store::FileMissionControlStore;
use std::sync::Arc;

/// Progress summary for one project.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ProjectProgress {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub skipped: usize,
    /// Human/review tasks not yet done or skipped.
    pub human_pending: usize,
    /// `(completed + skipped) / total * 100`, rounded to one decimal.
    pub percent: f64,
}

/// Business API over the Mission Control store.
pub struct MissionControlManager {
    store: Arc<FileMissionControlStore>,
    bus: MessageBus,
}

impl MissionControlManager {
    pub fn new(store: Arc<FileMissionControlStore>, bus: MessageBus) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &Arc<FileMissionControlStore> {
        &self.store
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    // Projects

    pub async fn create_project(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        tags: Vec<String>,
        creator_id: impl Into<String>,
    ) -> Result<Project> {
        let mut project = Project::new(title, description);
        project.tags = tags;
        project.creator_id = creator_id.into();
        self.store.save_project(&project).await?;

        self.log_activity(
            Activity::new(
                ActivityType::ProjectCreated,
                format!("Project created: '{}'", project.title),
            )
            .with_project(&project.id),
        )
        .await;

        Ok(project)
    }

    pub async fn get_project(&self, project_id: &str) -> Option<Project> {
        self.store.get_project(project_id).await
    }

    pub async fn list_projects(&self, status: Option<ProjectStatus>) -> Vec<Project> {
        self.store
            .list_projects()
            .await
            .into_iter()
            .filter(|p| status.is_none_or(|s| p.status == s))
            .collect()
    }

    pub async fn update_project(&self, project: &mut Project) -> Result<()> {
        project.touch();
        self.store.save_project(project).await
    }

    pub async fn set_project_status(
        &self,
        project_id: &str,
        status: ProjectStatus,
    ) -> Result<Project> {
        let mut project =
            self.store
                .get_project(project_id)
                .await
                .ok_or_else(|| StoreError::NotFound {
                    kind: "project",
                    id: project_id.to_string(),
                })?;
        project.status = status;
        project.touch();
        self.store.save_project(&project).await?;
        Ok(project)
    }

    /// Delete a project; its tasks go with it.
    pub async fn delete_project(&self, project_id: &str) -> Result<bool> {
        self.store.delete_project(project_id).await
    }

    // Tasks

    pub async fn create_task(&self, task: Task) -> Result<Task> {
        self.store.save_task(&task).await?;
        self.log_activity(
            Activity::new(
                ActivityType::TaskCreated,
                format!("Task created: '{}'", task.title),
            )
            .with_task(&task.id),
        )
        .await;
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.store.get_task(task_id).await
    }

    pub async fn get_project_tasks(&self, project_id: &str) -> Vec<Task> {
        self.store.list_tasks(Some(project_id)).await
    }

    pub async fn assign_task(&self, task_id: &str, agent_ids: Vec<String>) -> Result<Task> {
        let mut task = self.require_task(task_id).await?;
        task.assignee_ids = agent_ids;
        if task.status == TaskStatus::Inbox {
            task.status = TaskStatus::Assigned;
        }
        task.touch();
        self.store.save_task(&task).await?;

        self.log_activity(
            Activity::new(
                ActivityType::TaskUpdated,
                format!("Task '{}' assigned", task.title),
            )
            .with_task(&task.id),
        )
        .await;
        Ok(task)
    }

    /// Change a task's status. Moving to done stamps `completed_at`
    /// atomically. Persists, logs an activity, then announces the change.
    pub async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        actor_agent_id: Option<&str>,
    ) -> Result<Task> {
        let mut task = self.require_task(task_id).await?;
        let previous = task.status;
        task.set_status(status);
        self.store.save_task(&task).await?;

        let mut activity = Activity::new(
            ActivityType::TaskUpdated,
            format!("Task '{}' moved {} -> {}", task.title, previous, status),
        )
        .with_task(&task.id);
        if let Some(agent_id) = actor_agent_id {
            activity = activity.with_agent(agent_id);
        }
        if let Some(project_id) = &task.project_id {
            activity = activity.with_project(project_id);
        }
        self.log_activity(activity).await;

        self.bus.publish_system(SystemEvent::new(
            "mc_task_status_changed",
            serde_json::json!({
                "task_id": task.id,
                "old_status": previous.as_str(),
                "new_status": status.as_str(),
                "agent_id": actor_agent_id,
            }),
        ));

        Ok(task)
    }

    /// Record a dependency edge on both ends.
    pub async fn link_dependency(&self, blocker_id: &str, blocked_id: &str) -> Result<()> {
        let mut blocker = self.require_task(blocker_id).await?;
        let mut blocked = self.require_task(blocked_id).await?;

        if !blocker.blocks.contains(&blocked.id) {
            blocker.blocks.push(blocked.id.clone());
            blocker.touch();
        }
        if !blocked.blocked_by.contains(&blocker.id) {
            blocked.blocked_by.push(blocker.id.clone());
            blocked.touch();
        }

        self.store.save_task(&blocker).await?;
        self.store.save_task(&blocked).await?;
        Ok(())
    }

    pub async fn get_project_progress(&self, project_id: &str) -> ProjectProgress {
        let tasks = self.get_project_tasks(project_id).await;
        let total = tasks.len();

        let mut completed = 0;
        let mut in_progress = 0;
        let mut blocked = 0;
        let mut skipped = 0;
        let mut human_pending = 0;

        for task in &tasks {
            match task.status {
                TaskStatus::Done => completed += 1,
                TaskStatus::InProgress => in_progress += 1,
                TaskStatus::Blocked => blocked += 1,
                TaskStatus::Skipped => skipped += 1,
                _ => {}
            }
            if matches!(task.task_type, TaskType::Human | TaskType::Review)
                && !task.status.satisfies_dependents()
            {
                human_pending += 1;
            }
        }

        let percent = if total == 0 {
            0.0
        } else {
            let raw = (completed + skipped) as f64 / total as f64 * 100.0;
            (raw * 10.0).round() / 10.0
        };

        ProjectProgress {
            total,
            completed,
            in_progress,
            blocked,
            skipped,
            human_pending,
            percent,
        }
    }

    // Agents

    pub async fn create_agent(&self, agent: AgentProfile) -> Result<AgentProfile> {
        self.store.save_agent(&agent).await?;
        self.log_activity(
            Activity::new(
                ActivityType::AgentCreated,
                format!("Agent joined: {} ({})", agent.name, agent.role),
            )
            .with_agent(&agent.id),
        )
        .await;
        Ok(agent)
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<AgentProfile> {
        self.store.get_agent(agent_id).await
    }

    pub async fn list_agents(&self) -> Vec<AgentProfile> {
        self.store.list_agents().await
    }

    pub async fn set_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        current_task_id: Option<String>,
    ) -> Result<AgentProfile> {
        let mut agent =
            self.store
                .get_agent(agent_id)
                .await
                .ok_or_else(|| StoreError::NotFound {
                    kind: "agent",
                    id: agent_id.to_string(),
                })?;
        agent.status = status;
        agent.current_task_id = current_task_id;
        agent.last_heartbeat = chrono::Utc::now();
        agent.touch();
        self.store.save_agent(&agent).await?;
        Ok(agent)
    }

    pub async fn delete_agent(&self, agent_id: &str) -> Result<bool> {
        self.store.delete_agent(agent_id).await
    }

    // Documents

    pub async fn save_document(&self, document: &Document) -> Result<()> {
        self.store.save_document(document).await
    }

    pub async fn get_document(&self, document_id: &str) -> Option<Document> {
        self.store.get_document(document_id).await
    }

    pub async fn get_task_documents(&self, task_id: &str) -> Vec<Document> {
        self.store.get_task_documents(task_id).await
    }

    // Notifications

    pub async fn save_notification(&self, notification: &Notification) -> Result<()> {
        self.store.save_notification(notification).await
    }

    // Activity feed

    pub async fn get_activity_feed(&self, limit: usize) -> Vec<Activity> {
        self.store.list_activities(limit).await
    }

    /// Persist an activity, then broadcast it. A store failure is logged
    /// and swallowed: the activity feed must never fail the operation that
    /// produced it.
    pub async fn log_activity(&self, activity: Activity) -> Activity {
        if let Err(error) = self.store.save_activity(&activity).await {
            tracing::warn!(%error, "failed to persist activity");
            return activity;
        }

        self.bus.publish_system(SystemEvent::new(
            "mc_activity_created",
            serde_json::json!({ "activity": activity }),
        ));
        activity
    }

    async fn require_task(&self, task_id: &str) -> Result<Task> {
        self.store
            .get_task(task_id)
            .await
            .ok_or_else(|| {
                StoreError::NotFound {
                    kind: "task",
                    id: task_id.to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> (MissionControlManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FileMissionControlStore::open(dir.path()).expect("open"));
        (MissionControlManager::new(store, MessageBus::new()), dir)
    }

    #[tokio::test]
    async fn progress_counts_and_percent() {
        let (manager, _dir) = manager().await;
        let project = manager
            .create_project("P", "", Vec::new(), "user")
            .await
            .expect("project");

        let statuses = [
            TaskStatus::Done,
            TaskStatus::Done,
            TaskStatus::Skipped,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Inbox,
        ];
        for status in statuses {
            let mut task = Task::new("t");
            task.project_id = Some(project.id.clone());
            task.status = status;
            manager.create_task(task).await.expect("task");
        }

        let progress = manager.get_project_progress(&project.id).await;
        assert_eq!(progress.total, 6);
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.skipped, 1);
        assert_eq!(progress.in_progress, 1);
        assert_eq!(progress.blocked, 1);
        assert_eq!(progress.percent, 50.0);
    }

    #[tokio::test]
    async fn progress_percent_rounds_to_one_decimal() {
        let (manager, _dir) = manager().await;
        let project = manager
            .create_project("P", "", Vec::new(), "user")
            .await
            .expect("project");

        for i in 0..3 {
            let mut task = Task::new("t");
            task.project_id = Some(project.id.clone());
            task.status = if i == 0 {
                TaskStatus::Done
            } else {
                TaskStatus::Inbox
            };
            manager.create_task(task).await.expect("task");
        }

        let progress = manager.get_project_progress(&project.id).await;
        assert_eq!(progress.percent, 33.3);
    }

    #[tokio::test]
    async fn progress_of_empty_project_is_zero() {
        let (manager, _dir) = manager().await;
        let project = manager
            .create_project("empty", "", Vec::new(), "user")
            .await
            .expect("project");
        let progress = manager.get_project_progress(&project.id).await;
        assert_eq!(progress.total, 0);
        assert_eq!(progress.percent, 0.0);
    }

    #[tokio::test]
    async fn human_pending_counts_open_human_and_review_tasks() {
        let (manager, _dir) = manager().await;
        let project = manager
            .create_project("P", "", Vec::new(), "user")
            .await
            .expect("project");

        let cases = [
            (TaskType::Human, TaskStatus::Inbox, true),
            (TaskType::Review, TaskStatus::Assigned, true),
            (TaskType::Human, TaskStatus::Done, false),
            (TaskType::Human, TaskStatus::Skipped, false),
            (TaskType::Agent, TaskStatus::Inbox, false),
        ];
        for (task_type, status, _) in cases {
            let mut task = Task::new("t");
            task.project_id = Some(project.id.clone());
            task.task_type = task_type;
            task.status = status;
            manager.create_task(task).await.expect("task");
        }

        let progress = manager.get_project_progress(&project.id).await;
        let expected = cases.iter().filter(|(_, _, pending)| *pending).count();
        assert_eq!(progress.human_pending, expected);
    }

    #[tokio::test]
    async fn status_change_stamps_completed_at_and_broadcasts() {
        let (manager, _dir) = manager().await;
        let mut sub = manager.bus().subscribe_system();

        let task = manager.create_task(Task::new("finish me")).await.expect("task");
        let updated = manager
            .update_task_status(&task.id, TaskStatus::Done, Some("agent-1"))
            .await
            .expect("update");

        assert_eq!(updated.status, TaskStatus::Done);
        assert!(updated.completed_at.is_some());

        let mut saw_status_change = false;
        while let Some(event) = sub.try_recv() {
            if event.event_type == "mc_task_status_changed" {
                assert_eq!(event.data["task_id"], task.id.as_str());
                assert_eq!(event.data["new_status"], "done");
                saw_status_change = true;
            }
        }
        assert!(saw_status_change, "expected mc_task_status_changed on the bus");
    }

    #[tokio::test]
    async fn status_change_on_unknown_task_is_not_found() {
        let (manager, _dir) = manager().await;
        let error = manager
            .update_task_status("no-such-task", TaskStatus::Done, None)
            .await
            .expect_err("unknown task must fail");
        assert!(error.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn link_dependency_is_symmetric_and_idempotent() {
        let (manager, _dir) = manager().await;
        let a = manager.create_task(Task::new("A")).await.expect("task");
        let b = manager.create_task(Task::new("B")).await.expect("task");

        manager.link_dependency(&a.id, &b.id).await.expect("link");
        manager.link_dependency(&a.id, &b.id).await.expect("relink");

        let a = manager.get_task(&a.id).await.expect("a");
        let b = manager.get_task(&b.id).await.expect("b");
        assert_eq!(a.blocks, vec![b.id.clone()]);
        assert_eq!(b.blocked_by, vec![a.id.clone()]);
    }

    #[tokio::test]
    async fn activity_persists_before_broadcast() {
        let (manager, _dir) = manager().await;
        let mut sub = manager.bus().subscribe_system();

        manager
            .log_activity(Activity::new(ActivityType::TaskUpdated, "ordering"))
            .await;

        let event = sub.try_recv().expect("broadcast after persist");
        assert_eq!(event.event_type, "mc_activity_created");

        let feed = manager.get_activity_feed(10).await;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].message, "ordering");
    }

    #[tokio::test]
    async fn assign_moves_inbox_task_to_assigned() {
        let (manager, _dir) = manager().await;
        let task = manager.create_task(Task::new("assign me")).await.expect("task");
        let assigned = manager
            .assign_task(&task.id, vec!["agent-9".into()])
            .await
            .expect("assign");
        assert_eq!(assigned.status, TaskStatus::Assigned);
        assert_eq!(assigned.assignee_ids, vec!["agent-9"]);
    }
}
