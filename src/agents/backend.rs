//! Agent backend contract.
//!
//! A backend wraps one LLM SDK and exposes a single streaming call. The
//! SDKs themselves live outside this crate; implementations are registered
//! on the [`BackendRegistry`] at startup, keyed by the backend name stored
//! on each agent profile.

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use super::router::AgentSettings;

/// Kinds of events an agent backend can yield.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Message,
    ToolUse,
    ToolResult,
    Error,
    Done,
}

/// A single typed event from an agent backend stream.
///
/// The stream ends at the first `Done` or `Error`, or when the consumer
/// stops iterating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Chunk {
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Message,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn tool_use(name: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::ToolUse,
            content: String::new(),
            metadata: Some(serde_json::json!({ "name": name.into() })),
        }
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::ToolResult,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Error,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn done() -> Self {
        Self {
            kind: ChunkKind::Done,
            content: String::new(),
            metadata: None,
        }
    }

    /// Tool name carried in the metadata of a `ToolUse` chunk.
    pub fn tool_name(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|meta| meta["name"].as_str())
            .unwrap_or("unknown")
    }
}

/// Lazy finite sequence of chunks from one agent run.
pub type ChunkStream = Pin<Box<dyn futures::Stream<Item = Chunk> + Send>>;

/// One streaming LLM backend.
#[async_trait::async_trait]
pub trait AgentBackend: Send + Sync {
    /// Start a run and return its chunk stream.
    async fn run(&self, prompt: &str) -> Result<ChunkStream>;

    /// Cancel the in-flight run. Idempotent; a backend with nothing running
    /// does nothing.
    async fn stop(&self);
}

/// Produces a backend instance for a task given its settings.
pub trait BackendFactory: Send + Sync {
    fn create(&self, settings: &AgentSettings) -> Result<Box<dyn AgentBackend>>;
}

type BackendConstructor = Arc<dyn Fn(&AgentSettings) -> Box<dyn AgentBackend> + Send + Sync>;

/// Registry of backend constructors keyed by backend name.
///
/// The embedder registers its SDK integrations at startup; requesting an
/// unregistered backend is an error, never a deferred import failure.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: HashMap<String, BackendConstructor>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&AgentSettings) -> Box<dyn AgentBackend> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn known_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl BackendFactory for BackendRegistry {
    fn create(&self, settings: &AgentSettings) -> Result<Box<dyn AgentBackend>> {
        let constructor = self
            .constructors
            .get(&settings.agent_backend)
            .ok_or_else(|| AgentError::UnknownBackend(settings.agent_backend.clone()))?;
        Ok(constructor(settings))
    }
}
