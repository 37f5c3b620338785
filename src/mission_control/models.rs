//! Mission Control data model.
//!
//! Every entity serializes to JSON with defaults for absent keys, so records
//! written by older versions load cleanly and `from_json(to_json(x)) == x`
//! holds for every entity kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Project lifecycle states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    AwaitingApproval,
    Approved,
    Executing,
    Paused,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 7] = [
        ProjectStatus::Draft,
        ProjectStatus::AwaitingApproval,
        ProjectStatus::Approved,
        ProjectStatus::Executing,
        ProjectStatus::Paused,
        ProjectStatus::Completed,
        ProjectStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::AwaitingApproval => "awaiting_approval",
            ProjectStatus::Approved => "approved",
            ProjectStatus::Executing => "executing",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Inbox,
    Assigned,
    InProgress,
    Review,
    Done,
    Skipped,
    Blocked,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Inbox,
        TaskStatus::Assigned,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
        TaskStatus::Skipped,
        TaskStatus::Blocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Inbox => "inbox",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Blocked => "blocked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }

    /// Whether this status satisfies downstream dependencies.
    /// Skipped tasks unblock dependents exactly like done tasks.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task priorities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [
        TaskPriority::Low,
        TaskPriority::Medium,
        TaskPriority::High,
        TaskPriority::Urgent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == value)
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a task gets done: by an agent, by a human, or as a review gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Agent,
    Human,
    Review,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Agent => "agent",
            TaskType::Human => "human",
            TaskType::Review => "review",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Agent availability states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Active,
    Busy,
    Offline,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Active => "active",
            AgentStatus::Busy => "busy",
            AgentStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Activity feed entry kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ProjectCreated,
    ProjectUpdated,
    TaskCreated,
    TaskUpdated,
    TaskCompleted,
    AgentCreated,
    DocumentCreated,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::ProjectCreated => "project_created",
            ActivityType::ProjectUpdated => "project_updated",
            ActivityType::TaskCreated => "task_created",
            ActivityType::TaskUpdated => "task_updated",
            ActivityType::TaskCompleted => "task_completed",
            ActivityType::AgentCreated => "agent_created",
            ActivityType::DocumentCreated => "document_created",
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Document kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[default]
    Note,
    Prd,
    Deliverable,
    Report,
    Spec,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Note => "note",
            DocumentType::Prd => "prd",
            DocumentType::Deliverable => "deliverable",
            DocumentType::Report => "report",
            DocumentType::Spec => "spec",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_project_status() -> ProjectStatus {
    ProjectStatus::Draft
}

/// A Deep Work project: a natural-language request decomposed into an
/// approved task graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_project_status")]
    pub status: ProjectStatus,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub prd_document_id: Option<String>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let created = now();
        Self {
            id: new_id(),
            title: title.into(),
            description: description.into(),
            tags: Vec::new(),
            status: ProjectStatus::Draft,
            creator_id: String::new(),
            prd_document_id: None,
            created_at: created,
            updated_at: created,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

fn default_task_status() -> TaskStatus {
    TaskStatus::Inbox
}

fn default_task_priority() -> TaskPriority {
    TaskPriority::Medium
}

/// A unit of work tracked in Mission Control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_task_status")]
    pub status: TaskStatus,
    #[serde(default = "default_task_priority")]
    pub priority: TaskPriority,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    /// Tasks that must finish before this one may start.
    #[serde(default)]
    pub blocked_by: Vec<String>,
    /// Tasks waiting on this one. Mirror of `blocked_by` on the other end.
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub active_description: String,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        let created = now();
        Self {
            id: new_id(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Inbox,
            priority: TaskPriority::Medium,
            assignee_ids: Vec::new(),
            creator_id: String::new(),
            parent_task_id: None,
            blocked_by: Vec::new(),
            blocks: Vec::new(),
            tags: Vec::new(),
            project_id: None,
            task_type: TaskType::Agent,
            active_description: String::new(),
            estimated_minutes: None,
            completed_at: None,
            metadata: HashMap::new(),
            created_at: created,
            updated_at: created,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now();
    }

    /// Set the status, stamping `completed_at` atomically when moving to
    /// done and clearing it when moving away.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.completed_at = if status == TaskStatus::Done {
            Some(now())
        } else {
            None
        };
        self.touch();
    }
}

fn default_agent_status() -> AgentStatus {
    AgentStatus::Idle
}

fn default_agent_level() -> u32 {
    1
}

/// An AI agent profile on the shared team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentProfile {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default = "default_agent_status")]
    pub status: AgentStatus,
    /// Task currently executing on this agent, if any.
    #[serde(default)]
    pub current_task_id: Option<String>,
    /// Which agent backend runs this profile.
    #[serde(default)]
    pub backend: String,
    #[serde(default = "default_agent_level")]
    pub level: u32,
    #[serde(default = "now")]
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        let created = now();
        Self {
            id: new_id(),
            name: name.into(),
            role: role.into(),
            description: String::new(),
            specialties: Vec::new(),
            status: AgentStatus::Idle,
            current_task_id: None,
            backend: "native".into(),
            level: 1,
            last_heartbeat: created,
            created_at: created,
            updated_at: created,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

/// Append-only activity feed entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(activity_type: ActivityType, message: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            activity_type,
            agent_id: None,
            task_id: None,
            project_id: None,
            message: message.into(),
            created_at: now(),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Stored document: notes, PRDs, and agent deliverables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub doc_type: DocumentType,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(title: impl Into<String>, content: impl Into<String>, doc_type: DocumentType) -> Self {
        let created = now();
        Self {
            id: new_id(),
            title: title.into(),
            content: content.into(),
            doc_type,
            author_id: String::new(),
            task_id: None,
            project_id: None,
            tags: Vec::new(),
            created_at: created,
            updated_at: created,
        }
    }
}

/// A notification delivered to a human or agent recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub recipient_id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(recipient_id: impl Into<String>, kind: impl Into<String>, body: impl Into<String>) -> Self {
        let created = now();
        Self {
            id: new_id(),
            recipient_id: recipient_id.into(),
            kind: kind.into(),
            body: body.into(),
            task_id: None,
            read: false,
            created_at: created,
            updated_at: created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T>(entity: &T) -> T
    where
        T: Serialize + serde::de::DeserializeOwned,
    {
        let json = serde_json::to_string(entity).expect("serialize");
        serde_json::from_str(&json).expect("deserialize")
    }

    #[test]
    fn task_defaults() {
        let task = Task::new("minimal");
        assert_eq!(task.status, TaskStatus::Inbox);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.task_type, TaskType::Agent);
        assert!(task.project_id.is_none());
        assert!(task.blocks.is_empty());
        assert_eq!(task.active_description, "");
        assert!(task.estimated_minutes.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn task_round_trip_preserves_every_field() {
        let mut task = Task::new("Round trip test");
        task.description = "Testing serialization round trip".into();
        task.status = TaskStatus::InProgress;
        task.priority = TaskPriority::Urgent;
        task.assignee_ids = vec!["agent-1".into(), "agent-2".into()];
        task.creator_id = "agent-0".into();
        task.parent_task_id = Some("parent-1".into());
        task.blocked_by = vec!["dep-1".into()];
        task.blocks = vec!["blocked-1".into(), "blocked-2".into()];
        task.tags = vec!["test".into(), "deep-work".into()];
        task.project_id = Some("proj-rt".into());
        task.task_type = TaskType::Human;
        task.active_description = "Running round trip test".into();
        task.estimated_minutes = Some(45);
        task.metadata.insert("key".into(), serde_json::json!({"nested": true}));

        assert_eq!(round_trip(&task), task);
    }

    #[test]
    fn task_loads_legacy_records_with_defaults() {
        let old = serde_json::json!({
            "id": "legacy-task",
            "title": "Old task",
            "status": "inbox",
            "priority": "medium",
            "assignee_ids": ["agent-1"],
            "blocked_by": [],
            "tags": ["legacy"],
        });
        let task: Task = serde_json::from_value(old).expect("legacy record loads");
        assert_eq!(task.id, "legacy-task");
        assert_eq!(task.assignee_ids, vec!["agent-1"]);
        assert!(task.project_id.is_none());
        assert_eq!(task.task_type, TaskType::Agent);
        assert!(task.blocks.is_empty());
        assert_eq!(task.active_description, "");
        assert!(task.estimated_minutes.is_none());
    }

    #[test]
    fn done_stamps_completed_at_and_other_statuses_clear_it() {
        let mut task = Task::new("stamp");
        task.set_status(TaskStatus::Done);
        assert!(task.completed_at.is_some());

        task.set_status(TaskStatus::Blocked);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn skipped_satisfies_dependents_like_done() {
        assert!(TaskStatus::Done.satisfies_dependents());
        assert!(TaskStatus::Skipped.satisfies_dependents());
        assert!(!TaskStatus::Review.satisfies_dependents());
        assert!(!TaskStatus::Blocked.satisfies_dependents());
    }

    #[test]
    fn project_round_trip() {
        let mut project = Project::new("Build something", "A project");
        project.tags = vec!["alpha".into()];
        project.status = ProjectStatus::AwaitingApproval;
        project.creator_id = "user-1".into();
        project.prd_document_id = Some("doc-1".into());
        assert_eq!(round_trip(&project), project);
    }

    #[test]
    fn agent_round_trip() {
        let mut agent = AgentProfile::new("Jarvis", "Squad Lead");
        agent.description = "Coordinates the team".into();
        agent.specialties = vec!["planning".into(), "review".into()];
        agent.status = AgentStatus::Busy;
        agent.current_task_id = Some("task-1".into());
        agent.backend = "claude_agent_sdk".into();
        agent.level = 3;
        assert_eq!(round_trip(&agent), agent);
    }

    #[test]
    fn activity_round_trip_with_optional_fields_absent() {
        let activity = Activity::new(ActivityType::TaskUpdated, "status changed");
        assert_eq!(round_trip(&activity), activity);

        let full = Activity::new(ActivityType::DocumentCreated, "deliverable saved")
            .with_agent("a1")
            .with_task("t1")
            .with_project("p1");
        assert_eq!(round_trip(&full), full);
    }

    #[test]
    fn document_serializes_type_under_legacy_key() {
        let doc = Document::new("Deliverable: X", "body", DocumentType::Deliverable);
        let value = serde_json::to_value(&doc).expect("serialize");
        assert_eq!(value["type"], "deliverable");
        assert_eq!(round_trip(&doc), doc);
    }

    #[test]
    fn notification_round_trip() {
        let mut notification = Notification::new("human-1", "task_ready", "Review task X");
        notification.task_id = Some("t1".into());
        notification.read = true;
        assert_eq!(round_trip(&notification), notification);
    }

    #[test]
    fn status_enums_parse_their_wire_names() {
        for status in TaskStatus::ALL {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        for status in ProjectStatus::ALL {
            assert_eq!(ProjectStatus::parse(status.as_str()), Some(status));
        }
        for priority in TaskPriority::ALL {
            assert_eq!(TaskPriority::parse(priority.as_str()), Some(priority));
        }
        assert!(TaskStatus::parse("nonsense").is_none());
    }
}
