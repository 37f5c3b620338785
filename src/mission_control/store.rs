//! File-backed Mission Control store.
//!
//! One JSON file per entity kind (`tasks.json`, `projects.json`, ...), each
//! holding an `id → entity` map. Everything is loaded into memory on open;
//! each mutation rewrites its kind's file atomically (write a temp file,
//! rename over the original). A per-kind lock serializes writers; reads see
//! a consistent snapshot per call. There are no cross-entity transactions —
//! callers compose higher-level operations and accept the race window.

use crate::error::{Result, StoreError};
use crate::mission_control::models::{
    Activity, AgentProfile, Document, Notification, Project, Task,
};
use anyhow::Context as _;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// One entity kind's in-memory map plus its backing file.
struct Collection<T> {
    kind: &'static str,
    path: PathBuf,
    entries: RwLock<HashMap<String, T>>,
}

impl<T: Clone + Serialize + DeserializeOwned> Collection<T> {
    fn open(dir: &Path, kind: &'static str) -> Result<Self> {
        let path = dir.join(format!("{kind}.json"));
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| StoreError::Load {
                kind,
                path: path.display().to_string(),
                source: source.into(),
            })?;
            serde_json::from_str(&raw).map_err(|source| StoreError::Load {
                kind,
                path: path.display().to_string(),
                source: source.into(),
            })?
        } else {
            HashMap::new()
        };

        Ok(Self {
            kind,
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Rewrite the backing file from the given snapshot. Called with the
    /// write lock held so concurrent writers cannot interleave.
    async fn persist(&self, entries: &HashMap<String, T>) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries).map_err(|source| StoreError::Persist {
            kind: self.kind,
            source: source.into(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))
            .map_err(|source| StoreError::Persist {
                kind: self.kind,
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to rename {} into place", tmp.display()))
            .map_err(|source| StoreError::Persist {
                kind: self.kind,
                source,
            })?;
        Ok(())
    }

    async fn upsert(&self, id: String, entity: T) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(id, entity);
        self.persist(&entries).await
    }

    async fn get(&self, id: &str) -> Option<T> {
        self.entries.read().await.get(id).cloned()
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(id).is_some();
        if removed {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    async fn remove_many(&self, ids: &[String]) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for id in ids {
            if entries.remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.persist(&entries).await?;
        }
        Ok(removed)
    }

    async fn list(&self) -> Vec<T> {
        self.entries.read().await.values().cloned().collect()
    }
}

/// Durable CRUD for projects, tasks, agents, activities, documents, and
/// notifications.
pub struct FileMissionControlStore {
    projects: Collection<Project>,
    tasks: Collection<Task>,
    agents: Collection<AgentProfile>,
    activities: Collection<Activity>,
    documents: Collection<Document>,
    notifications: Collection<Notification>,
}

impl FileMissionControlStore {
    /// Open (or initialize) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create store directory: {}", dir.display()))?;

        Ok(Self {
            projects: Collection::open(dir, "projects")?,
            tasks: Collection::open(dir, "tasks")?,
            agents: Collection::open(dir, "agents")?,
            activities: Collection::open(dir, "activities")?,
            documents: Collection::open(dir, "documents")?,
            notifications: Collection::open(dir, "notifications")?,
        })
    }

    // Projects

    pub async fn save_project(&self, project: &Project) -> Result<()> {
        self.projects
            .upsert(project.id.clone(), project.clone())
            .await
    }

    pub async fn get_project(&self, id: &str) -> Option<Project> {
        self.projects.get(id).await
    }

    pub async fn list_projects(&self) -> Vec<Project> {
        let mut projects = self.projects.list().await;
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        projects
    }

    /// Delete a project and every task that belongs to it. Documents,
    /// activities, and agents are untouched.
    pub async fn delete_project(&self, id: &str) -> Result<bool> {
        let task_ids: Vec<String> = self
            .tasks
            .list()
            .await
            .into_iter()
            .filter(|task| task.project_id.as_deref() == Some(id))
            .map(|task| task.id)
            .collect();
        self.tasks.remove_many(&task_ids).await?;
        self.projects.remove(id).await
    }

    // Tasks

    pub async fn save_task(&self, task: &Task) -> Result<()> {
        self.tasks.upsert(task.id.clone(), task.clone()).await
    }

    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).await
    }

    /// All tasks, optionally filtered to one project. Linear scan.
    pub async fn list_tasks(&self, project_id: Option<&str>) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .list()
            .await
            .into_iter()
            .filter(|task| match project_id {
                Some(project_id) => task.project_id.as_deref() == Some(project_id),
                None => true,
            })
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    pub async fn delete_task(&self, id: &str) -> Result<bool> {
        self.tasks.remove(id).await
    }

    // Agents

    pub async fn save_agent(&self, agent: &AgentProfile) -> Result<()> {
        self.agents.upsert(agent.id.clone(), agent.clone()).await
    }

    pub async fn get_agent(&self, id: &str) -> Option<AgentProfile> {
        self.agents.get(id).await
    }

    pub async fn list_agents(&self) -> Vec<AgentProfile> {
        let mut agents = self.agents.list().await;
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        agents
    }

    pub async fn delete_agent(&self, id: &str) -> Result<bool> {
        self.agents.remove(id).await
    }

    // Activities

    pub async fn save_activity(&self, activity: &Activity) -> Result<()> {
        self.activities
            .upsert(activity.id.clone(), activity.clone())
            .await
    }

    /// Most recent activities first.
    pub async fn list_activities(&self, limit: usize) -> Vec<Activity> {
        let mut activities = self.activities.list().await;
        activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        activities.truncate(limit);
        activities
    }

    // Documents

    pub async fn save_document(&self, document: &Document) -> Result<()> {
        self.documents
            .upsert(document.id.clone(), document.clone())
            .await
    }

    pub async fn get_document(&self, id: &str) -> Option<Document> {
        self.documents.get(id).await
    }

    /// All documents linked to a task. Linear scan.
    pub async fn get_task_documents(&self, task_id: &str) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .documents
            .list()
            .await
            .into_iter()
            .filter(|doc| doc.task_id.as_deref() == Some(task_id))
            .collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        documents
    }

    // Notifications

    pub async fn save_notification(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .upsert(notification.id.clone(), notification.clone())
            .await
    }

    pub async fn list_notifications(&self, recipient_id: Option<&str>) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .list()
            .await
            .into_iter()
            .filter(|n| match recipient_id {
                Some(recipient_id) => n.recipient_id == recipient_id,
                None => true,
            })
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications
    }
}
