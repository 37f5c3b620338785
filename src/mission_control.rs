//! Mission Control: shared workspace where a team of AI agents works
//! together on projects, tasks, and deliverables.

pub mod executor;
pub mod manager;
pub mod models;
pub mod store;

pub use executor::{ExecutionOutcome, ExecutionStatus, TaskExecutor};
pub use manager::{MissionControlManager, ProjectProgress};
pub use models::{
    Activity, ActivityType, AgentProfile, AgentStatus, Document, DocumentType, Notification,
    Project, ProjectStatus, Task, TaskPriority, TaskStatus, TaskType,
};
pub use store::FileMissionControlStore;
