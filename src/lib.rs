//! PocketPaw: an on-device AI agent host.
//!
//! Natural-language project descriptions are decomposed by planner agents
//! into a dependency graph of tasks, executed concurrently by a shared
//! agent team under a hard concurrency cap, with execution events streamed
//! to chat channels and live dashboards over an in-process message bus.

pub mod agents;
pub mod api;
pub mod app;
pub mod bus;
pub mod config;
pub mod deep_work;
pub mod error;
pub mod mission_control;

pub use app::App;
pub use error::{Error, Result};
