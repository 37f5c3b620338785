//! Deep Work: natural-language projects decomposed into an approved task
//! graph, executed level by level through the Mission Control executor.

pub mod planner;
pub mod scheduler;
pub mod session;

pub use planner::{PlanOutput, PlanRequest, PlannedAgent, PlannedTask, Planner};
pub use scheduler::{DependencyScheduler, HumanTaskNotifier, NotificationHumanTaskNotifier};
pub use session::{DeepWorkSession, VALID_RESEARCH_DEPTHS};
