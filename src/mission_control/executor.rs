//! Mission Control task executor.
//!
//! Runs AI agents against tasks with a dedicated router per task for
//! isolation, streams execution onto the bus for the dashboard, persists
//! deliverables on success, and fires the scheduler callback after every
//! terminal transition so deferred tasks get a re-dispatch chance.
//!
//! Security posture: a hard concurrency cap, UUID validation on incoming
//! ids, and error sanitization before anything user-visible leaves the
//! process.

use crate::agents::backend::{BackendFactory, ChunkKind};
use crate::agents::router::{AgentRouter, AgentSettings};
use crate::bus::events::SystemEvent;
use crate::bus::queue::MessageBus;
use crate::config::Settings;
use crate::mission_control::manager::MissionControlManager;
use crate::mission_control::models::{
    Activity, ActivityType, AgentProfile, AgentStatus, Document, DocumentType, Task, TaskStatus,
};
use futures::StreamExt as _;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Hard cap on concurrent task executions.
pub const MAX_CONCURRENT_TASKS: usize = 5;

/// Error messages are truncated to this many characters before broadcast.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 200;

static UUID_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
    )
    .expect("UUID pattern is valid")
});

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Error,
    Stopped,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Stopped => "stopped",
        }
    }
}

/// Result of one `execute_task` call.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub output: String,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    fn error(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            output: String::new(),
            error: Some(message.into()),
        }
    }
}

/// Callback invoked with the task id after every terminal transition.
pub type TaskDoneCallback =
    Arc<dyn Fn(String) -> futures::future::BoxFuture<'static, ()> + Send + Sync>;

struct RunningTask {
    handle: tokio::task::JoinHandle<()>,
    done_rx: watch::Receiver<bool>,
}

#[derive(Default)]
struct ExecutorState {
    running: HashMap<String, RunningTask>,
    routers: HashMap<String, Arc<AgentRouter>>,
    stop_flags: HashMap<String, CancellationToken>,
    /// Tasks whose handle was registered by `execute_task_background` before
    /// the body started; consumed by `execute_task` so the body does not
    /// mistake its own registration for a duplicate.
    background_launched: HashSet<String>,
}

/// Executes Mission Control tasks with AI agents.
pub struct TaskExecutor {
    manager: Arc<MissionControlManager>,
    bus: MessageBus,
    settings: Arc<Settings>,
    backends: Arc<dyn BackendFactory>,
    state: Mutex<ExecutorState>,
    on_task_done: Mutex<Option<TaskDoneCallback>>,
}

impl TaskExecutor {
    pub fn new(
        manager: Arc<MissionControlManager>,
        bus: MessageBus,
        settings: Arc<Settings>,
        backends: Arc<dyn BackendFactory>,
    ) -> Self {
        Self {
            manager,
            bus,
            settings,
            backends,
            state: Mutex::new(ExecutorState::default()),
            on_task_done: Mutex::new(None),
        }
    }

    /// Register the scheduler callback. Fires for every terminal status
    /// (completed, stopped, error) so capacity-deferred tasks get retried.
    pub fn set_on_task_done(&self, callback: TaskDoneCallback) {
        *self.on_task_done.lock().expect("executor lock poisoned") = Some(callback);
    }

    pub fn is_task_running(&self, task_id: &str) -> bool {
        self.state
            .lock()
            .expect("executor lock poisoned")
            .running
            .contains_key(task_id)
    }

    pub fn running_tasks(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("executor lock poisoned")
            .running
            .keys()
            .cloned()
            .collect()
    }

    /// Start task execution in the background. Returns immediately.
    ///
    /// `false` means the dispatch was rejected: either the executor is at
    /// capacity (the scheduler retries on the next completion callback) or
    /// the task is already running.
    pub fn execute_task_background(self: &Arc<Self>, task_id: &str, agent_id: &str) -> bool {
        let mut state = self.state.lock().expect("executor lock poisoned");

        // Capacity check BEFORE registering, so N simultaneous dispatches
        // cannot all register and then all reject themselves.
        if state.running.len() >= MAX_CONCURRENT_TASKS {
            tracing::info!(
                %task_id,
                running = state.running.len(),
                cap = MAX_CONCURRENT_TASKS,
                "deferring task: at capacity"
            );
            return false;
        }

        if state.running.contains_key(task_id) {
            tracing::warn!(%task_id, "task is already running, skipping duplicate dispatch");
            return false;
        }

        state.background_launched.insert(task_id.to_string());

        let (done_tx, done_rx) = watch::channel(false);
        let executor = self.clone();
        let owned_task_id = task_id.to_string();
        let owned_agent_id = agent_id.to_string();
        let handle = tokio::spawn(async move {
            let _ = executor
                .execute_task(&owned_task_id, &owned_agent_id)
                .await;
            // The body's own finalization normally clears these; early
            // returns (validation failures) must not leave zombie entries.
            {
                let mut state = executor.state.lock().expect("executor lock poisoned");
                state.running.remove(&owned_task_id);
                state.background_launched.remove(&owned_task_id);
                state.routers.remove(&owned_task_id);
                state.stop_flags.remove(&owned_task_id);
            }
            let _ = done_tx.send(true);
        });

        state
            .running
            .insert(task_id.to_string(), RunningTask { handle, done_rx });
        true
    }

    /// Execute a task with the specified agent, blocking until it finishes.
    pub async fn execute_task(&self, task_id: &str, agent_id: &str) -> ExecutionOutcome {
        if !is_valid_uuid(task_id) {
            tracing::warn!(task_id = %audit_snippet(task_id), "security: invalid task_id format");
            return ExecutionOutcome::error("Invalid task ID format");
        }
        if !is_valid_uuid(agent_id) {
            tracing::warn!(agent_id = %audit_snippet(agent_id), "security: invalid agent_id format");
            return ExecutionOutcome::error("Invalid agent ID format");
        }

        // Capacity recheck for direct callers. A task launched via
        // execute_task_background already passed the capacity gate and its
        // own registration counts toward the cap, so it is exempt here.
        {
            let state = self.state.lock().expect("executor lock poisoned");
            if state.running.len() >= MAX_CONCURRENT_TASKS
                && !state.background_launched.contains(task_id)
            {
                tracing::warn!(%task_id, "rejecting task: max concurrent tasks reached");
                return ExecutionOutcome::error(format!(
                    "Maximum concurrent tasks ({MAX_CONCURRENT_TASKS}) reached."
                ));
            }
        }

        let Some(task) = self.manager.get_task(task_id).await else {
            return ExecutionOutcome::error("Task not found");
        };
        let Some(agent) = self.manager.get_agent(agent_id).await else {
            return ExecutionOutcome::error("Agent not found");
        };

        // Self-duplicate check: skip only when another caller is running
        // this task, i.e. the entry in `running` is not our own background
        // registration.
        let stop_token = {
            let mut state = self.state.lock().expect("executor lock poisoned");
            let was_background = state.background_launched.remove(task_id);
            if state.running.contains_key(task_id) && !was_background {
                return ExecutionOutcome::error("Task is already running");
            }
            let token = CancellationToken::new();
            state.stop_flags.insert(task_id.to_string(), token.clone());
            token
        };

        tracing::info!(
            %task_id,
            %agent_id,
            agent_name = %agent.name,
            task_title = %task.title,
            "task execution starting"
        );

        let body = self
            .run_task_body(&task, &agent, stop_token)
            .await;

        self.finalize(&task, &agent, &body).await;
        body
    }

    /// Stop a running task: flip the stop flag, stop the router, then wait
    /// for the body to finish its cleanup. Returns `true` iff the task was
    /// running.
    pub async fn stop_task(&self, task_id: &str) -> bool {
        let (token, router, done_rx) = {
            let state = self.state.lock().expect("executor lock poisoned");
            if !state.running.contains_key(task_id) {
                return false;
            }
            (
                state.stop_flags.get(task_id).cloned(),
                state.routers.get(task_id).cloned(),
                state.running.get(task_id).map(|r| r.done_rx.clone()),
            )
        };

        if let Some(token) = token {
            token.cancel();
        }
        if let Some(router) = router {
            router.stop().await;
        }

        if let Some(mut done_rx) = done_rx {
            let finished = tokio::time::timeout(
                std::time::Duration::from_secs(30),
                done_rx.wait_for(|done| *done),
            )
            .await;
            if finished.is_err() {
                // The body did not observe the flag in time; drop it hard.
                let mut state = self.state.lock().expect("executor lock poisoned");
                if let Some(running) = state.running.remove(task_id) {
                    running.handle.abort();
                }
                state.routers.remove(task_id);
                state.stop_flags.remove(task_id);
            }
        }

        tracing::info!(%task_id, "stopped task execution");
        true
    }

    /// Stream the agent run and collect its outcome. Status transitions,
    /// event broadcast, and prompt construction happen here; cleanup is the
    /// caller's `finalize`.
    async fn run_task_body(
        &self,
        task: &Task,
        agent: &AgentProfile,
        stop_token: CancellationToken,
    ) -> ExecutionOutcome {
        // Status transitions persist before the started broadcast.
        if let Err(error) = self
            .manager
            .update_task_status(&task.id, TaskStatus::InProgress, Some(&agent.id))
            .await
        {
            return ExecutionOutcome::error(sanitize_error(&error.to_string()));
        }
        if let Err(error) = self
            .manager
            .set_agent_status(&agent.id, AgentStatus::Active, Some(task.id.clone()))
            .await
        {
            return ExecutionOutcome::error(sanitize_error(&error.to_string()));
        }

        self.broadcast(
            "mc_task_started",
            serde_json::json!({
                "task_id": task.id,
                "agent_id": agent.id,
                "agent_name": agent.name,
                "task_title": task.title,
            }),
        );

        self.manager
            .log_activity(
                Activity::new(
                    ActivityType::TaskUpdated,
                    format!("{} started working on '{}'", agent.name, task.title),
                )
                .with_agent(&agent.id)
                .with_task(&task.id),
            )
            .await;

        let prompt = self.build_task_prompt(task, agent).await;

        // Dedicated router per task; bypass_permissions is always on because
        // headless runs have no terminal to approve tools interactively.
        let agent_settings = AgentSettings::for_task(&self.settings, &agent.backend);
        let router = match AgentRouter::new(&agent_settings, self.backends.as_ref()) {
            Ok(router) => Arc::new(router),
            Err(error) => {
                return ExecutionOutcome::error(sanitize_error(&error.to_string()));
            }
        };
        self.state
            .lock()
            .expect("executor lock poisoned")
            .routers
            .insert(task.id.clone(), router.clone());

        let mut stream = match router.run(&prompt).await {
            Ok(stream) => stream,
            Err(error) => {
                return ExecutionOutcome::error(sanitize_error(&error.to_string()));
            }
        };

        let mut output = String::new();
        let mut status = ExecutionStatus::Completed;
        let mut error_message = None;

        loop {
            let chunk = tokio::select! {
                _ = stop_token.cancelled() => {
                    status = ExecutionStatus::Stopped;
                    break;
                }
                chunk = stream.next() => match chunk {
                    Some(chunk) => chunk,
                    None => break,
                },
            };

            if stop_token.is_cancelled() {
                status = ExecutionStatus::Stopped;
                break;
            }

            match chunk.kind {
                ChunkKind::Message if !chunk.content.is_empty() => {
                    output.push_str(&chunk.content);
                    self.broadcast(
                        "mc_task_output",
                        serde_json::json!({
                            "task_id": task.id,
                            "content": chunk.content,
                            "output_type": "message",
                        }),
                    );
                }
                ChunkKind::Message => {}
                ChunkKind::ToolUse => {
                    self.broadcast(
                        "mc_task_output",
                        serde_json::json!({
                            "task_id": task.id,
                            "content": format!("Using tool: {}", chunk.tool_name()),
                            "output_type": "tool_use",
                        }),
                    );
                }
                ChunkKind::ToolResult => {
                    let result: String = chunk.content.chars().take(200).collect();
                    self.broadcast(
                        "mc_task_output",
                        serde_json::json!({
                            "task_id": task.id,
                            "content": format!("Tool result: {result}"),
                            "output_type": "tool_result",
                        }),
                    );
                }
                ChunkKind::Error => {
                    error_message = Some(sanitize_error(&chunk.content));
                    status = ExecutionStatus::Error;
                    break;
                }
                ChunkKind::Done => break,
            }
        }

        ExecutionOutcome {
            status,
            output,
            error: error_message,
        }
    }

    /// Cleanup that always runs: release tracking state, settle task and
    /// agent statuses, broadcast completion, persist the deliverable, and
    /// fire the scheduler callback regardless of outcome.
    async fn finalize(&self, task: &Task, agent: &AgentProfile, outcome: &ExecutionOutcome) {
        {
            let mut state = self.state.lock().expect("executor lock poisoned");
            state.routers.remove(&task.id);
            state.running.remove(&task.id);
            state.stop_flags.remove(&task.id);
        }

        let new_status = if outcome.status == ExecutionStatus::Completed {
            TaskStatus::Done
        } else {
            TaskStatus::Blocked
        };
        if let Err(error) = self
            .manager
            .update_task_status(&task.id, new_status, Some(&agent.id))
            .await
        {
            tracing::warn!(%error, task_id = %task.id, "failed to settle task status");
        }
        if let Err(error) = self
            .manager
            .set_agent_status(&agent.id, AgentStatus::Idle, None)
            .await
        {
            tracing::warn!(%error, agent_id = %agent.id, "failed to settle agent status");
        }

        self.broadcast(
            "mc_task_completed",
            serde_json::json!({
                "task_id": task.id,
                "agent_id": agent.id,
                "status": outcome.status.as_str(),
                "error": outcome.error,
            }),
        );

        match outcome.status {
            ExecutionStatus::Completed => {
                self.manager
                    .log_activity(
                        Activity::new(
                            ActivityType::TaskCompleted,
                            format!("{} completed '{}'", agent.name, task.title),
                        )
                        .with_agent(&agent.id)
                        .with_task(&task.id),
                    )
                    .await;

                if !outcome.output.trim().is_empty() {
                    self.save_task_deliverable(task, agent, &outcome.output).await;
                }
            }
            ExecutionStatus::Error => {
                self.manager
                    .log_activity(
                        Activity::new(
                            ActivityType::TaskUpdated,
                            format!(
                                "{} encountered an error on '{}': {}",
                                agent.name,
                                task.title,
                                outcome.error.as_deref().unwrap_or("An error occurred"),
                            ),
                        )
                        .with_agent(&agent.id)
                        .with_task(&task.id),
                    )
                    .await;
            }
            ExecutionStatus::Stopped => {
                self.manager
                    .log_activity(
                        Activity::new(
                            ActivityType::TaskUpdated,
                            format!("Execution stopped for '{}'", task.title),
                        )
                        .with_agent(&agent.id)
                        .with_task(&task.id),
                    )
                    .await;
            }
        }

        // Direct scheduler callback, bypassing the bus, so cascade dispatch
        // survives slow subscribers. Fires for every terminal status so
        // capacity-deferred tasks are retried when this slot frees up.
        let callback = self
            .on_task_done
            .lock()
            .expect("executor lock poisoned")
            .clone();
        if let Some(callback) = callback {
            callback(task.id.clone()).await;
        }
    }

    /// Persist agent output as a deliverable document linked to the task.
    async fn save_task_deliverable(&self, task: &Task, agent: &AgentProfile, output: &str) {
        let mut document = Document::new(
            format!("Deliverable: {}", task.title),
            output,
            DocumentType::Deliverable,
        );
        document.author_id = agent.id.clone();
        document.task_id = Some(task.id.clone());
        document.project_id = task.project_id.clone();
        document.tags = vec!["auto-generated".into(), "task-output".into()];

        if let Err(error) = self.manager.save_document(&document).await {
            tracing::warn!(%error, task_id = %task.id, "failed to save deliverable");
            return;
        }

        tracing::info!(
            doc_id = %document.id,
            task_id = %task.id,
            length = output.len(),
            "saved task deliverable"
        );

        self.manager
            .log_activity(
                Activity::new(
                    ActivityType::DocumentCreated,
                    format!("Deliverable saved for '{}'", task.title),
                )
                .with_agent(&agent.id)
                .with_task(&task.id),
            )
            .await;
    }

    /// Build the prompt for an agent run: identity, project context with a
    /// PRD summary, upstream deliverables, and the task block.
    async fn build_task_prompt(&self, task: &Task, agent: &AgentProfile) -> String {
        let mut parts = vec![format!("You are {}, a {}.", agent.name, agent.role)];

        if !agent.description.is_empty() {
            parts.push(format!("Description: {}", agent.description));
        }
        if !agent.specialties.is_empty() {
            parts.push(format!("Specialties: {}", agent.specialties.join(", ")));
        }

        if let Some(project_id) = &task.project_id {
            if let Some(project) = self.manager.get_project(project_id).await {
                parts.push(String::new());
                parts.push("## Project Context".into());
                parts.push(format!("**Project:** {}", project.title));
                if let Ok(project_dir) = self.settings.project_dir(&project.id) {
                    parts.push(format!("**Working Directory:** {}", project_dir.display()));
                }

                if let Some(prd_id) = &project.prd_document_id
                    && let Some(prd) = self.manager.get_document(prd_id).await
                    && !prd.content.is_empty()
                {
                    parts.push(String::new());
                    parts.push("### Requirements (PRD)".into());
                    parts.push(truncate_with_marker(&prd.content, 2000));
                }
            }

            let mut upstream = Vec::new();
            for dep_id in &task.blocked_by {
                let Some(dep) = self.manager.get_task(dep_id).await else {
                    continue;
                };
                if dep.status != TaskStatus::Done {
                    continue;
                }
                let latest = self
                    .manager
                    .get_task_documents(dep_id)
                    .await
                    .into_iter()
                    .filter(|doc| !doc.content.is_empty())
                    .next_back();
                if let Some(doc) = latest {
                    upstream.push(format!(
                        "**{}:**\n{}",
                        dep.title,
                        truncate_with_marker(&doc.content, 1000)
                    ));
                }
            }
            if !upstream.is_empty() {
                parts.push(String::new());
                parts.push("### Upstream Task Outputs".into());
                parts.push(
                    "The following tasks have been completed before yours. \
                     Use their output as context:"
                        .into(),
                );
                parts.push(String::new());
                parts.extend(upstream);
            }
        }

        parts.push(String::new());
        parts.push("## Task".into());
        parts.push(format!("**Title:** {}", task.title));
        if !task.description.is_empty() {
            parts.push(format!("**Description:** {}", task.description));
        }
        parts.push(format!("**Priority:** {}", task.priority));
        parts.push(String::new());
        parts.push("Please complete this task. Provide your work and findings.".into());

        parts.join("\n")
    }

    fn broadcast(&self, event_type: &str, mut data: serde_json::Value) {
        if let Some(object) = data.as_object_mut() {
            object.insert(
                "timestamp".to_string(),
                serde_json::json!(chrono::Utc::now()),
            );
        }
        self.bus.publish_system(SystemEvent::new(event_type, data));
    }
}

fn is_valid_uuid(value: &str) -> bool {
    !value.is_empty() && UUID_PATTERN.is_match(value)
}

fn audit_snippet(value: &str) -> String {
    value.chars().take(50).collect()
}

/// Truncate `value` to at most `max_chars` characters, appending a
/// `"... (truncated)"` marker when truncation occurred.
fn truncate_with_marker(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let truncated: String = value.chars().take(max_chars).collect();
    format!("{}... (truncated)", truncated.trim_end())
}

/// Sanitize an error message for safe broadcast: truncate, strip path-like
/// tokens, and redact anything that looks like a credential.
pub fn sanitize_error(error: &str) -> String {
    static PATH_PATTERN: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"/[^\s]+/[^\s]+").expect("path pattern is valid"));
    static SECRET_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?i)(key|token|secret|password)[=:]\s*\S+")
            .expect("secret pattern is valid")
    });

    if error.is_empty() {
        return "An error occurred".to_string();
    }

    let truncated: String = error.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect();
    let sanitized = PATH_PATTERN.replace_all(&truncated, "[path]");
    let sanitized = SECRET_PATTERN.replace_all(&sanitized, "$1=[redacted]");

    let mut sanitized = sanitized.into_owned();
    if error.chars().count() > MAX_ERROR_MESSAGE_LENGTH {
        sanitized = format!("{}...", sanitized.trim_end());
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::backend::testing::scripted_registry;
    use crate::agents::backend::{BackendRegistry, Chunk};
    use crate::mission_control::store::FileMissionControlStore;
    use std::time::Duration;

    struct Fixture {
        executor: Arc<TaskExecutor>,
        manager: Arc<MissionControlManager>,
        bus: MessageBus,
        _dir: tempfile::TempDir,
    }

    async fn fixture(registry: BackendRegistry) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FileMissionControlStore::open(dir.path()).expect("open store"));
        let bus = MessageBus::new();
        let manager = Arc::new(MissionControlManager::new(store, bus.clone()));
        let settings = Arc::new(Settings::for_dir(dir.path()));
        let executor = Arc::new(TaskExecutor::new(
            manager.clone(),
            bus.clone(),
            settings,
            Arc::new(registry),
        ));
        Fixture {
            executor,
            manager,
            bus,
            _dir: dir,
        }
    }

    async fn seed_task_and_agent(manager: &MissionControlManager) -> (Task, AgentProfile) {
        let agent = manager
            .create_agent(AgentProfile::new("Rex", "Researcher"))
            .await
            .expect("agent");
        let task = manager
            .create_task(Task::new("Research competitors"))
            .await
            .expect("task");
        (task, agent)
    }

    #[tokio::test]
    async fn successful_run_persists_deliverable_and_settles_statuses() {
        let fx = fixture(scripted_registry(
            vec![
                Chunk::message("Findings: "),
                Chunk::message("all good."),
                Chunk::done(),
            ],
            Duration::ZERO,
        ))
        .await;
        let (task, agent) = seed_task_and_agent(&fx.manager).await;

        let outcome = fx.executor.execute_task(&task.id, &agent.id).await;
        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert_eq!(outcome.output, "Findings: all good.");

        let task = fx.manager.get_task(&task.id).await.expect("task");
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.completed_at.is_some());

        let agent = fx.manager.get_agent(&agent.id).await.expect("agent");
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.current_task_id.is_none());

        let docs = fx.manager.get_task_documents(&task.id).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].doc_type, DocumentType::Deliverable);
        assert_eq!(docs[0].content, "Findings: all good.");
    }

    #[tokio::test]
    async fn events_arrive_in_started_output_completed_order() {
        let fx = fixture(scripted_registry(
            vec![Chunk::message("chunk"), Chunk::done()],
            Duration::ZERO,
        ))
        .await;
        let (task, agent) = seed_task_and_agent(&fx.manager).await;
        let mut sub = fx.bus.subscribe_system();

        fx.executor.execute_task(&task.id, &agent.id).await;

        let mut mc_events = Vec::new();
        while let Some(event) = sub.try_recv() {
            if event.event_type.starts_with("mc_task_") {
                mc_events.push(event.event_type);
            }
        }

        let started = mc_events.iter().position(|e| e == "mc_task_started");
        let output = mc_events.iter().position(|e| e == "mc_task_output");
        let completed = mc_events.iter().position(|e| e == "mc_task_completed");
        assert!(started < output, "started must precede output: {mc_events:?}");
        assert!(output < completed, "output must precede completed: {mc_events:?}");
    }

    #[tokio::test]
    async fn error_chunk_blocks_task_and_sanitizes_message() {
        let fx = fixture(scripted_registry(
            vec![Chunk::error("boom: key=sk-abc123 at /opt/paw/run.rs")],
            Duration::ZERO,
        ))
        .await;
        let (task, agent) = seed_task_and_agent(&fx.manager).await;

        let outcome = fx.executor.execute_task(&task.id, &agent.id).await;
        assert_eq!(outcome.status, ExecutionStatus::Error);
        let error = outcome.error.expect("error message");
        assert!(error.contains("[redacted]"), "got {error}");
        assert!(!error.contains("sk-abc123"), "got {error}");

        let task = fx.manager.get_task(&task.id).await.expect("task");
        assert_eq!(task.status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected_with_structured_errors() {
        let fx = fixture(scripted_registry(vec![Chunk::done()], Duration::ZERO)).await;

        let outcome = fx.executor.execute_task("../../etc/passwd", "x").await;
        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert_eq!(outcome.error.as_deref(), Some("Invalid task ID format"));

        let valid = uuid::Uuid::new_v4().to_string();
        let outcome = fx.executor.execute_task(&valid, "not-a-uuid").await;
        assert_eq!(outcome.error.as_deref(), Some("Invalid agent ID format"));
    }

    #[tokio::test]
    async fn unknown_task_and_agent_are_structured_errors() {
        let fx = fixture(scripted_registry(vec![Chunk::done()], Duration::ZERO)).await;
        let (task, _agent) = seed_task_and_agent(&fx.manager).await;

        let ghost = uuid::Uuid::new_v4().to_string();
        let outcome = fx.executor.execute_task(&ghost, &ghost).await;
        assert_eq!(outcome.error.as_deref(), Some("Task not found"));

        let outcome = fx.executor.execute_task(&task.id, &ghost).await;
        assert_eq!(outcome.error.as_deref(), Some("Agent not found"));
    }

    #[tokio::test]
    async fn duplicate_background_dispatch_runs_exactly_once() {
        let fx = fixture(scripted_registry(
            vec![Chunk::message("slow"), Chunk::done()],
            Duration::from_millis(100),
        ))
        .await;
        let (task, agent) = seed_task_and_agent(&fx.manager).await;

        let first = fx.executor.execute_task_background(&task.id, &agent.id);
        let second = fx.executor.execute_task_background(&task.id, &agent.id);
        assert!(first);
        assert!(!second, "second dispatch for the same task must be rejected");
        assert_eq!(fx.executor.running_tasks().len(), 1);

        wait_until_idle(&fx.executor).await;
        assert!(
            !fx.executor.is_task_running(&task.id),
            "no zombie entry after completion"
        );

        let docs = fx.manager.get_task_documents(&task.id).await;
        assert_eq!(docs.len(), 1, "exactly one execution, one deliverable");
    }

    #[tokio::test]
    async fn capacity_cap_defers_the_sixth_task() {
        let fx = fixture(scripted_registry(
            vec![Chunk::message("work"), Chunk::done()],
            Duration::from_millis(200),
        ))
        .await;

        let mut dispatched = Vec::new();
        for i in 0..6 {
            let agent = fx
                .manager
                .create_agent(AgentProfile::new(format!("A{i}"), "Worker"))
                .await
                .expect("agent");
            let task = fx
                .manager
                .create_task(Task::new(format!("T{i}")))
                .await
                .expect("task");
            dispatched.push(fx.executor.execute_task_background(&task.id, &agent.id));
        }

        assert_eq!(dispatched.iter().filter(|ok| **ok).count(), 5);
        assert!(!dispatched[5], "sixth dispatch must be deferred");
        assert!(fx.executor.running_tasks().len() <= MAX_CONCURRENT_TASKS);

        wait_until_idle(&fx.executor).await;
    }

    #[tokio::test]
    async fn stop_task_blocks_task_and_reports_stopped() {
        let fx = fixture(scripted_registry(
            vec![
                Chunk::message("starting"),
                Chunk::message("never finishes"),
                Chunk::done(),
            ],
            Duration::from_secs(10),
        ))
        .await;
        let (task, agent) = seed_task_and_agent(&fx.manager).await;

        assert!(fx.executor.execute_task_background(&task.id, &agent.id));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(fx.executor.stop_task(&task.id).await);
        assert!(!fx.executor.is_task_running(&task.id));

        let task = fx.manager.get_task(&task.id).await.expect("task");
        assert_eq!(task.status, TaskStatus::Blocked);

        assert!(
            !fx.executor.stop_task(&task.id).await,
            "stopping an idle task returns false"
        );
    }

    #[tokio::test]
    async fn callback_fires_for_all_terminal_statuses() {
        let fired: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        // Completed
        let fx = fixture(scripted_registry(vec![Chunk::done()], Duration::ZERO)).await;
        let fired_clone = fired.clone();
        fx.executor.set_on_task_done(Arc::new(move |task_id| {
            let fired = fired_clone.clone();
            Box::pin(async move {
                fired.lock().expect("lock poisoned").push(task_id);
            })
        }));
        let (task, agent) = seed_task_and_agent(&fx.manager).await;
        fx.executor.execute_task(&task.id, &agent.id).await;
        assert_eq!(fired.lock().expect("lock poisoned").as_slice(), [task.id.clone()]);

        // Error
        let fx = fixture(scripted_registry(
            vec![Chunk::error("nope")],
            Duration::ZERO,
        ))
        .await;
        let fired_clone = fired.clone();
        fx.executor.set_on_task_done(Arc::new(move |task_id| {
            let fired = fired_clone.clone();
            Box::pin(async move {
                fired.lock().expect("lock poisoned").push(task_id);
            })
        }));
        let (task, agent) = seed_task_and_agent(&fx.manager).await;
        fx.executor.execute_task(&task.id, &agent.id).await;
        assert_eq!(fired.lock().expect("lock poisoned").len(), 2);
        assert_eq!(fired.lock().expect("lock poisoned")[1], task.id);
    }

    #[tokio::test]
    async fn prompt_includes_identity_prd_and_upstream_outputs() {
        let fx = fixture(scripted_registry(vec![Chunk::done()], Duration::ZERO)).await;

        let project = fx
            .manager
            .create_project("Launch", "", Vec::new(), "user")
            .await
            .expect("project");
        let mut prd = Document::new("PRD", "The requirements body", DocumentType::Prd);
        prd.project_id = Some(project.id.clone());
        fx.manager.save_document(&prd).await.expect("prd");
        let mut project = project;
        project.prd_document_id = Some(prd.id.clone());
        fx.manager.update_project(&mut project).await.expect("update");

        let mut agent = AgentProfile::new("Ada", "Engineer");
        agent.description = "Writes careful code".into();
        agent.specialties = vec!["rust".into(), "apis".into()];
        let agent = fx.manager.create_agent(agent).await.expect("agent");

        let mut upstream = Task::new("Design schema");
        upstream.project_id = Some(project.id.clone());
        upstream.status = TaskStatus::Done;
        let upstream = fx.manager.create_task(upstream).await.expect("upstream");
        let mut deliverable = Document::new(
            "Deliverable: Design schema",
            "the schema output",
            DocumentType::Deliverable,
        );
        deliverable.task_id = Some(upstream.id.clone());
        fx.manager.save_document(&deliverable).await.expect("doc");

        let mut task = Task::new("Implement API");
        task.description = "Build the endpoints".into();
        task.project_id = Some(project.id.clone());
        task.blocked_by = vec![upstream.id.clone()];
        let task = fx.manager.create_task(task).await.expect("task");

        let prompt = fx.executor.build_task_prompt(&task, &agent).await;
        assert!(prompt.contains("You are Ada, a Engineer."));
        assert!(prompt.contains("Specialties: rust, apis"));
        assert!(prompt.contains("**Project:** Launch"));
        assert!(prompt.contains("### Requirements (PRD)"));
        assert!(prompt.contains("The requirements body"));
        assert!(prompt.contains("### Upstream Task Outputs"));
        assert!(prompt.contains("the schema output"));
        assert!(prompt.contains("**Title:** Implement API"));
        assert!(prompt.contains("**Priority:** medium"));
    }

    #[tokio::test]
    async fn long_prd_is_truncated_in_prompt() {
        let fx = fixture(scripted_registry(vec![Chunk::done()], Duration::ZERO)).await;

        let project = fx
            .manager
            .create_project("Big", "", Vec::new(), "user")
            .await
            .expect("project");
        let mut prd = Document::new("PRD", "x".repeat(3000), DocumentType::Prd);
        prd.project_id = Some(project.id.clone());
        fx.manager.save_document(&prd).await.expect("prd");
        let mut project = project;
        project.prd_document_id = Some(prd.id.clone());
        fx.manager.update_project(&mut project).await.expect("update");

        let agent = fx
            .manager
            .create_agent(AgentProfile::new("Ada", "Engineer"))
            .await
            .expect("agent");
        let mut task = Task::new("T");
        task.project_id = Some(project.id.clone());
        let task = fx.manager.create_task(task).await.expect("task");

        let prompt = fx.executor.build_task_prompt(&task, &agent).await;
        assert!(prompt.contains("... (truncated)"));
    }

    async fn wait_until_idle(executor: &Arc<TaskExecutor>) {
        for _ in 0..200 {
            if executor.running_tasks().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("executor did not drain in time");
    }

    mod sanitize {
        use super::super::sanitize_error;

        #[test]
        fn redacts_credentials() {
            let sanitized = sanitize_error("request failed: key=sk-abc123");
            assert!(sanitized.contains("key=[redacted]"), "got {sanitized}");
            assert!(!sanitized.contains("sk-abc123"));
        }

        #[test]
        fn strips_path_like_tokens() {
            let sanitized = sanitize_error("cannot open /home/user/secrets.txt here");
            assert!(sanitized.contains("[path]"), "got {sanitized}");
            assert!(!sanitized.contains("/home/user"));
        }

        #[test]
        fn truncates_with_ellipsis_and_bounded_length() {
            let long = "e".repeat(500);
            let sanitized = sanitize_error(&long);
            assert!(sanitized.ends_with("..."));
            assert!(sanitized.chars().count() <= 203, "got {}", sanitized.len());
        }

        #[test]
        fn empty_input_gets_a_default() {
            assert_eq!(sanitize_error(""), "An error occurred");
        }
    }
}
