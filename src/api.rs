//! HTTP API for the PocketPaw dashboard and integrations.
//!
//! Serves the JSON API under `/api` and a WebSocket endpoint streaming bus
//! events to connected dashboards.

mod agents;
mod deep_work;
mod projects;
mod server;
mod state;
mod system;
mod tasks;

pub use server::{find_free_port, start_http_server};
pub use state::ApiState;
